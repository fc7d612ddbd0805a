//! Temperature readings to share with peers

use rand::Rng;

/// Lowest simulated reading, inclusive
pub const SIMULATED_MIN: i64 = -20;
/// Highest simulated reading, exclusive
pub const SIMULATED_MAX: i64 = 40;

/// Source of the temperature attached to a shared status report
pub trait Thermometer: Send {
    fn read(&mut self) -> i64;
}

/// Uniformly random whole degrees in `[-20, 40)`
#[derive(Debug, Default, Clone, Copy)]
pub struct SimulatedThermometer;

impl Thermometer for SimulatedThermometer {
    fn read(&mut self) -> i64 {
        rand::rng().random_range(SIMULATED_MIN..SIMULATED_MAX)
    }
}

/// Always reports the same value
#[derive(Debug, Clone, Copy)]
pub struct FixedThermometer(pub i64);

impl Thermometer for FixedThermometer {
    fn read(&mut self) -> i64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulated_readings_in_range() {
        let mut thermometer = SimulatedThermometer;
        for _ in 0..1000 {
            let reading = thermometer.read();
            assert!((SIMULATED_MIN..SIMULATED_MAX).contains(&reading), "reading: {reading}");
        }
    }

    #[test]
    fn test_fixed_reading() {
        let mut thermometer = FixedThermometer(-5);
        assert_eq!(thermometer.read(), -5);
        assert_eq!(thermometer.read(), -5);
    }
}
