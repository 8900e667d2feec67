//! Link-layer service identifiers.
//!
//! Opening a link to a peer requires naming the service to connect to.  On
//! Bluetooth Classic this is the 128-bit service class UUID that the peer
//! publishes in its SDP record; the radio stack resolves it to a channel.
//! RadioLink does not parse anything behind the identifier, it only passes it
//! through to the platform when creating a link.

use uuid::Uuid;

/// Identifier of the remote service a link connects to.
pub type ServiceId = Uuid;

/// Human Interface Device service (`0x1812`), used by remote shutters and
/// other HID-class peripherals.  This is the default service.
pub const HID_SERVICE: ServiceId = Uuid::from_u128(0x0000_1812_0000_1000_8000_0080_5f9b_34fb);

/// Serial Port Profile service (`0x1101`).
pub const SERIAL_PORT_SERVICE: ServiceId =
    Uuid::from_u128(0x0000_1101_0000_1000_8000_0080_5f9b_34fb);
