//! MQTT client options.

use std::time::Duration;

use rumqttc::{MqttOptions, QoS};

use crate::config::MqttConfig;

/// Build MQTT client options from the provided configuration.
///
/// Sessions are clean (MQTT 3.1.1), so subscriptions must be renewed on every
/// connect.
pub fn mqtt_options(config: &MqttConfig, client_id: &str) -> MqttOptions {
    let mut options = MqttOptions::new(client_id, config.host.clone(), config.port);
    options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
    options.set_clean_session(true);

    if let (Some(username), Some(password)) = (&config.username, &config.password) {
        options.set_credentials(username.clone(), password.clone());
    }

    tracing::debug!(
        client_id = %client_id,
        host = %config.host,
        port = config.port,
        keep_alive_secs = config.keep_alive_secs,
        "Built MQTT options"
    );

    options
}

/// Map a configured QoS level to the client type.
///
/// Levels above 2 are rejected by [`MqttConfig::validate`]; should one get
/// through anyway it falls back to the default, at most once.
pub fn qos(level: u8) -> QoS {
    match level {
        1 => QoS::AtLeastOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtMostOnce,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mqtt_options() {
        let mut config = MqttConfig::new("192.168.88.106");
        config.port = 1884;
        config.keep_alive_secs = 30;

        let options = mqtt_options(&config, "hy01-switch-3");

        assert_eq!(options.client_id(), "hy01-switch-3");
        assert_eq!(
            options.broker_address(),
            ("192.168.88.106".to_string(), 1884)
        );
        assert_eq!(options.keep_alive(), Duration::from_secs(30));
        assert!(options.clean_session());
    }

    #[test]
    fn test_qos_mapping() {
        assert_eq!(qos(0), QoS::AtMostOnce);
        assert_eq!(qos(1), QoS::AtLeastOnce);
        assert_eq!(qos(2), QoS::ExactlyOnce);
        assert_eq!(qos(3), QoS::AtMostOnce);
        assert_eq!(qos(u8::MAX), QoS::AtMostOnce);
    }
}
