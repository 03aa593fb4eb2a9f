pub mod capability;
pub mod date;
pub mod holidays;
pub mod registry;
pub mod timezone;
pub mod weather;

pub use capability::{decode_arguments, AnyCapability, Capability};
pub use registry::CapabilityRegistry;

use date::DateCapability;
use holidays::{HolidaysCapability, HolidaysConfig};
use timezone::TimezoneCapability;
use weather::{WeatherCapability, WeatherConfig};

/// The registry advertised by the assistant: weather, date, holidays, timezone, in that order
pub fn standard_registry(
    weather: WeatherConfig,
    holidays: HolidaysConfig,
) -> anyhow::Result<CapabilityRegistry> {
    let registry = CapabilityRegistry::new()
        .with(WeatherCapability::new(weather)?)?
        .with(DateCapability::new())?
        .with(HolidaysCapability::new(holidays)?)?
        .with(TimezoneCapability::new())?;
    Ok(registry)
}
