mod memory;
mod weather;

pub use memory::{SaveMemoryArgs, SaveMemoryTool, SearchMemoryArgs, SearchMemoryTool};
pub use weather::{GeoLocation, OpenMeteoClient, WeatherQueryArgs, WeatherTool};
