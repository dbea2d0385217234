//! Tests for subscriber installation.

use pace::telemetry::{init_console_telemetry, init_json_telemetry};

#[test]
fn test_second_subscriber_is_rejected() {
    assert!(init_console_telemetry().is_ok());
    assert!(init_json_telemetry().is_err());
    assert!(init_console_telemetry().is_err());
}
