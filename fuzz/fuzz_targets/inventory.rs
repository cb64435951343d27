#![no_main]
use libfuzzer_sys::fuzz_target;
use kafka_broker_config::{BrokerDefaults, BrokerRegistry, resolve};

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(registry) = BrokerRegistry::from_json_str(s) else {
        return;
    };

    let defaults = BrokerDefaults::default();
    for (host, entry) in &registry {
        let config = resolve(host, &registry, &defaults).expect("host from registry resolves");
        assert_eq!(config.broker_id, entry.id);
        assert_ne!(config.port, 0);
    }
});
