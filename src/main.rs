use std::env;
use std::str::FromStr;

use log::{error, info, warn, LevelFilter};

use linux_lib::bh1750::{Bh1750, Mode, DEVICE_ADDRESS};
use linux_lib::logger;

const MEASUREMENT_TIMES: [u8; 3] = [31, 69, 254];

const RUNS: [(&str, Mode); 3] = [
    ("one time L ", Mode::OneShotLow),
    ("one time H ", Mode::OneShotHigh),
    ("one time H2", Mode::OneShotHigh2),
];

struct Config {
    bus: String,
    address: u8,
    samples: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bus: String::from("/dev/i2c-1"),
            address: DEVICE_ADDRESS,
            samples: 10,
        }
    }
}

impl Config {
    fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(bus) = env::var("BH1750_BUS") {
            config.bus = bus;
        }
        if let Ok(value) = env::var("BH1750_ADDRESS") {
            match parse_address(&value) {
                Some(address) => config.address = address,
                None => warn!("ignoring BH1750_ADDRESS={value}"),
            }
        }
        if let Ok(value) = env::var("BH1750_SAMPLES") {
            match value.parse() {
                Ok(samples) => config.samples = samples,
                Err(_) => warn!("ignoring BH1750_SAMPLES={value}"),
            }
        }
        config
    }
}

fn parse_address(value: &str) -> Option<u8> {
    match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some(hex) => u8::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    }
}

fn log_level() -> LevelFilter {
    env::var("BH1750_LOG")
        .ok()
        .and_then(|value| LevelFilter::from_str(&value).ok())
        .unwrap_or(LevelFilter::Info)
}

fn run(config: &Config, label: &str, mode: Mode, measurement_time: u8) {
    let mut sensor = match Bh1750::create(&config.bus, config.address, mode) {
        Ok(sensor) => sensor,
        Err(err) => {
            error!("unable to create sensor: {err}");
            return;
        }
    };

    if let Err(err) = sensor.configure(measurement_time) {
        error!("unable to configure measurement time: {err}");
    } else {
        info!("{label} {measurement_time}");
        for _ in 0..config.samples {
            match sensor.read() {
                Ok(lux) => info!("\t{lux:.2} lx"),
                Err(err) => {
                    error!("unable to read sensor: {err}");
                    break;
                }
            }
        }
    }

    if let Err(err) = sensor.destroy() {
        warn!("unable to release {}: {err}", config.bus);
    }
}

fn main() {
    let _ = logger::init(log_level());
    let config = Config::from_env();
    info!("BH1750 at {:#04x} on {}", config.address, config.bus);

    for measurement_time in MEASUREMENT_TIMES {
        for (label, mode) in RUNS {
            run(&config, label, mode, measurement_time);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addresses() {
        assert_eq!(parse_address("0x5c"), Some(0x5c));
        assert_eq!(parse_address("0X23"), Some(0x23));
        assert_eq!(parse_address("35"), Some(0x23));
        assert_eq!(parse_address("0x123"), None);
        assert_eq!(parse_address("bus"), None);
    }
}
