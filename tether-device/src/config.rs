use std::time::Duration;

use super::error::PumpError;
use super::transport::Protocol;

const DEFAULT_SEND_PERIOD: Duration = Duration::from_millis(10);
const DEFAULT_RECEIVE_PERIOD: Duration = Duration::from_millis(10);

// poll-style transports pay a full request per receive, so they
// check for cloud-to-device messages far less often
const DEFAULT_POLLING_RECEIVE_PERIOD: Duration = Duration::from_secs(25 * 60);

/// Cadence of the periodic send and receive work
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PumpConfig {
    pub send_period: Duration,
    pub receive_period: Duration,
}

impl PumpConfig {
    /// Default cadences for the given protocol
    pub fn for_protocol(protocol: Protocol) -> Self {
        let receive_period = if protocol.is_polling() {
            DEFAULT_POLLING_RECEIVE_PERIOD
        } else {
            DEFAULT_RECEIVE_PERIOD
        };

        Self {
            send_period: DEFAULT_SEND_PERIOD,
            receive_period,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), PumpError> {
        if self.send_period.is_zero() {
            return Err(PumpError::Configuration(
                "send period must be greater than zero".into(),
            ));
        }
        if self.receive_period.is_zero() {
            return Err(PumpError::Configuration(
                "receive period must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn polling_protocols_receive_every_25_minutes() {
        let config = PumpConfig::for_protocol(Protocol::Https);
        assert_eq!(config.send_period, Duration::from_millis(10));
        assert_eq!(config.receive_period, Duration::from_secs(1500));
    }

    #[test]
    fn streaming_protocols_receive_every_10_ms() {
        for protocol in [
            Protocol::Amqps,
            Protocol::AmqpsWs,
            Protocol::Mqtt,
            Protocol::MqttWs,
        ] {
            let config = PumpConfig::for_protocol(protocol);
            assert_eq!(config.send_period, Duration::from_millis(10));
            assert_eq!(config.receive_period, Duration::from_millis(10));
        }
    }

    #[test]
    fn zero_periods_are_rejected() {
        let config = PumpConfig {
            send_period: Duration::ZERO,
            receive_period: Duration::from_millis(10),
        };
        assert!(matches!(
            config.validate(),
            Err(PumpError::Configuration(_))
        ));

        let config = PumpConfig {
            send_period: Duration::from_millis(10),
            receive_period: Duration::ZERO,
        };
        assert!(matches!(
            config.validate(),
            Err(PumpError::Configuration(_))
        ));
    }
}
