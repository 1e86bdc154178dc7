use std::sync::Arc;
use tracing::debug;

use crate::config::GuardConfig;

/// Live device state consulted before a sync starts.
pub trait RuntimeConditions: Send + Sync {
    /// `None` when the device has no battery.
    fn battery_percent(&self) -> Option<u8>;
    fn is_charging(&self) -> bool;
    fn network_available(&self) -> bool;
    fn is_metered(&self) -> bool;
}

/// Mains-powered, always-online host.
pub struct UnrestrictedConditions;

impl RuntimeConditions for UnrestrictedConditions {
    fn battery_percent(&self) -> Option<u8> {
        None
    }

    fn is_charging(&self) -> bool {
        true
    }

    fn network_available(&self) -> bool {
        true
    }

    fn is_metered(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Proceed,
    Defer(String),
}

pub struct RuntimeGuard {
    conditions: Arc<dyn RuntimeConditions>,
    config: GuardConfig,
}

impl RuntimeGuard {
    pub fn new(conditions: Arc<dyn RuntimeConditions>, config: GuardConfig) -> Self {
        Self { conditions, config }
    }

    pub fn unrestricted() -> Self {
        Self::new(Arc::new(UnrestrictedConditions), GuardConfig::default())
    }

    pub fn check(&self) -> GuardDecision {
        let decision = if !self.conditions.network_available() {
            GuardDecision::Defer("network unavailable".to_string())
        } else if self.conditions.is_metered() && !self.config.allow_metered {
            GuardDecision::Defer("metered network".to_string())
        } else {
            match self.conditions.battery_percent() {
                Some(level)
                    if level < self.config.min_battery_percent
                        && !self.conditions.is_charging() =>
                {
                    GuardDecision::Defer(format!("battery low ({}%)", level))
                }
                _ => GuardDecision::Proceed,
            }
        };
        debug!("Runtime guard: {:?}", decision);
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Conditions {
        battery: Option<u8>,
        charging: bool,
        online: bool,
        metered: bool,
    }

    impl RuntimeConditions for Conditions {
        fn battery_percent(&self) -> Option<u8> {
            self.battery
        }
        fn is_charging(&self) -> bool {
            self.charging
        }
        fn network_available(&self) -> bool {
            self.online
        }
        fn is_metered(&self) -> bool {
            self.metered
        }
    }

    fn guard(conditions: Conditions, allow_metered: bool) -> RuntimeGuard {
        RuntimeGuard::new(
            Arc::new(conditions),
            GuardConfig {
                min_battery_percent: 15,
                allow_metered,
            },
        )
    }

    #[test]
    fn test_unrestricted_always_proceeds() {
        assert_eq!(RuntimeGuard::unrestricted().check(), GuardDecision::Proceed);
    }

    #[test]
    fn test_offline_defers() {
        let decision = guard(
            Conditions {
                battery: Some(90),
                charging: false,
                online: false,
                metered: false,
            },
            true,
        )
        .check();
        assert_eq!(decision, GuardDecision::Defer("network unavailable".to_string()));
    }

    #[test]
    fn test_low_battery_defers_unless_charging() {
        let low = |charging| Conditions {
            battery: Some(9),
            charging,
            online: true,
            metered: false,
        };
        assert!(matches!(guard(low(false), true).check(), GuardDecision::Defer(_)));
        assert_eq!(guard(low(true), true).check(), GuardDecision::Proceed);
    }

    #[test]
    fn test_metered_network_respects_config() {
        let metered = || Conditions {
            battery: None,
            charging: false,
            online: true,
            metered: true,
        };
        assert_eq!(guard(metered(), true).check(), GuardDecision::Proceed);
        assert!(matches!(guard(metered(), false).check(), GuardDecision::Defer(_)));
    }
}
