//! BLE Service and Characteristic UUIDs.
//!
//! These values are the wire-level contract with the board controller
//! firmware and must match exactly.

use uuid::Uuid;

/// Service UUID advertised by Aurora board controllers. Used as the scan filter.
pub const AURORA_ADVERTISING_UUID: Uuid = Uuid::from_u128(0x4488_b571_7806_4df6_bcff_a2897e4953ff);

// UART Service (Nordic NUS - Nordic UART Service)
/// Nordic UART Service UUID, which carries climb data on the controller.
pub const AURORA_SERVICE_UUID: Uuid = Uuid::from_u128(0x6e40_0001_b5a3_f393_e0a9_e50e24dcca9e);
/// UART RX characteristic UUID (write to board).
pub const AURORA_WRITE_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x6e40_0002_b5a3_f393_e0a9_e50e24dcca9e);
