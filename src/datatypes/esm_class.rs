// ABOUTME: Strongly-typed SMPP ESM class bitfield with message mode and type validation
// ABOUTME: Provides compile-time guarantees for ESM class format and prevents invalid combinations

use std::fmt;

/// ESM (External Short Message) Class bitfield that encodes message mode and type
/// This replaces raw u8 values with a strongly-typed structure that enforces SMPP rules
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct EsmClass {
    /// Bits 7-2: Message Mode
    message_mode: MessageMode,
    /// Bits 1-0: Message Type (context depends on message mode)
    message_type: MessageType,
    /// Additional message features/flags
    features: EsmFeatures,
}

impl EsmClass {
    /// Converts to the raw u8 value for wire protocol
    pub fn to_byte(&self) -> u8 {
        let mode_bits = (self.message_mode as u8) << 2; // Bits 3-2: Message Mode
        let type_bits = self.message_type.to_bits(); // Bits 1-0: Message Type
        let feature_bits = self.features.to_bits(); // Bits 7-4: Features

        mode_bits | type_bits | feature_bits
    }

    /// Creates an ESM class from a raw u8 value
    pub fn from_byte(value: u8) -> Result<Self, EsmClassError> {
        let mode_bits = (value >> 2) & 0x03; // Bits 3-2: Message Mode
        let type_bits = value & 0x03; // Bits 1-0: Message Type
        let feature_bits = value & 0xF0; // Bits 7-4: Feature bits

        let message_mode = MessageMode::from_bits(mode_bits)
            .ok_or(EsmClassError::InvalidMessageMode(mode_bits))?;

        let message_type = MessageType::from_bits(type_bits, message_mode).ok_or(
            EsmClassError::InvalidMessageType {
                mode: message_mode,
                type_bits,
            },
        )?;

        let features = EsmFeatures::from_bits(feature_bits);

        Ok(Self {
            message_mode,
            message_type,
            features,
        })
    }

    /// Validates that the message type is appropriate for the message mode
    pub fn validate(&self) -> Result<(), EsmClassError> {
        match (self.message_mode, &self.message_type) {
            (MessageMode::Default, MessageType::Default) => Ok(()),
            (MessageMode::Datagram, MessageType::Default) => Ok(()),
            (MessageMode::Forward, MessageType::Default) => Ok(()),
            (MessageMode::StoreAndForward, MessageType::StoreAndForward(_)) => Ok(()),
            _ => Err(EsmClassError::InvalidCombination {
                mode: self.message_mode,
                message_type: self.message_type,
            }),
        }
    }
}

/// Message delivery modes defined by SMPP protocol
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[repr(u8)]
pub enum MessageMode {
    /// Default SMSC mode (store and forward)
    Default = 0b00,
    /// Datagram mode
    Datagram = 0b01,
    /// Forward (transaction) mode
    Forward = 0b10,
    /// Store and forward mode (explicit)
    StoreAndForward = 0b11,
}

impl MessageMode {
    /// Converts from bit representation
    fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0b00 => Some(MessageMode::Default),
            0b01 => Some(MessageMode::Datagram),
            0b10 => Some(MessageMode::Forward),
            0b11 => Some(MessageMode::StoreAndForward),
            _ => None,
        }
    }
}

/// Message types that vary based on the message mode
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum MessageType {
    /// Default message type (no special handling)
    Default,
    /// Store and forward specific message types
    StoreAndForward(StoreAndForwardType),
}

impl MessageType {
    /// Converts to bit representation for wire protocol
    fn to_bits(self) -> u8 {
        match self {
            MessageType::Default => 0b00,
            MessageType::StoreAndForward(sf_type) => sf_type as u8,
        }
    }

    /// Creates from bit representation and message mode context
    fn from_bits(bits: u8, mode: MessageMode) -> Option<Self> {
        match mode {
            MessageMode::Default | MessageMode::Datagram | MessageMode::Forward => {
                if bits == 0b00 {
                    Some(MessageType::Default)
                } else {
                    None // Other values not valid for these modes
                }
            }
            MessageMode::StoreAndForward => {
                StoreAndForwardType::from_bits(bits).map(MessageType::StoreAndForward)
            }
        }
    }
}

/// Store and forward message type variants
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[repr(u8)]
pub enum StoreAndForwardType {
    /// Default store and forward
    Default = 0b00,
    /// Delivery acknowledgment
    DeliveryAck = 0b01,
    /// Manual/User acknowledgment
    UserAck = 0b10,
    /// Both delivery and user acknowledgment
    BothAck = 0b11,
}

impl StoreAndForwardType {
    /// Converts from bit representation
    fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0b00 => Some(StoreAndForwardType::Default),
            0b01 => Some(StoreAndForwardType::DeliveryAck),
            0b10 => Some(StoreAndForwardType::UserAck),
            0b11 => Some(StoreAndForwardType::BothAck),
            _ => None,
        }
    }
}

/// Additional ESM class features and flags
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct EsmFeatures {
    /// User Data Header Indicator (bit 6)
    pub udhi: bool,
    /// Reply path (bit 5) - GSM specific
    pub reply_path: bool,
    /// Status report request (bit 4) - operator specific
    pub status_report_request: bool,
}

impl EsmFeatures {
    /// Creates features with all flags disabled
    fn none() -> Self {
        Self {
            udhi: false,
            reply_path: false,
            status_report_request: false,
        }
    }

    /// Converts features to bit representation
    fn to_bits(self) -> u8 {
        let mut bits = 0u8;
        if self.udhi {
            bits |= 0x40;
        } // Bit 6
        if self.reply_path {
            bits |= 0x20;
        } // Bit 5
        if self.status_report_request {
            bits |= 0x10;
        } // Bit 4
        bits
    }

    /// Creates features from bit representation
    fn from_bits(bits: u8) -> Self {
        Self {
            udhi: (bits & 0x40) != 0,
            reply_path: (bits & 0x20) != 0,
            status_report_request: (bits & 0x10) != 0,
        }
    }
}

impl Default for EsmFeatures {
    fn default() -> Self {
        Self::none()
    }
}

/// Errors that can occur when creating or validating ESM classes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EsmClassError {
    /// Invalid message mode bits
    InvalidMessageMode(u8),
    /// Invalid message type for the given mode
    InvalidMessageType { mode: MessageMode, type_bits: u8 },
    /// Invalid combination of mode and message type
    InvalidCombination {
        mode: MessageMode,
        message_type: MessageType,
    },
}

impl fmt::Display for EsmClassError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EsmClassError::InvalidMessageMode(bits) => {
                write!(f, "Invalid message mode bits: 0x{bits:02X}")
            }
            EsmClassError::InvalidMessageType { mode, type_bits } => {
                write!(
                    f,
                    "Invalid message type bits 0x{type_bits:02X} for mode {mode:?}"
                )
            }
            EsmClassError::InvalidCombination { mode, message_type } => {
                write!(
                    f,
                    "Invalid combination: mode {mode:?} with message type {message_type:?}"
                )
            }
        }
    }
}

impl std::error::Error for EsmClassError {}

// Default implementation
impl Default for EsmClass {
    fn default() -> Self {
        Self {
            message_mode: MessageMode::Default,
            message_type: MessageType::Default,
            features: EsmFeatures::default(),
        }
    }
}

// Display implementation
impl fmt::Display for EsmClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EsmClass(mode: {:?}, type: {:?}",
            self.message_mode, self.message_type
        )?;
        if self.features != EsmFeatures::default() {
            write!(f, ", features: {:?}", self.features)?;
        }
        write!(f, ")")
    }
}

impl fmt::Debug for EsmClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EsmClass")
            .field("message_mode", &self.message_mode)
            .field("message_type", &self.message_type)
            .field("features", &self.features)
            .field("byte_value", &format!("0x{:02X}", self.to_byte()))
            .finish()
    }
}

// Conversion implementations
impl From<u8> for EsmClass {
    fn from(value: u8) -> Self {
        Self::from_byte(value).unwrap_or_else(|_| Self::default())
    }
}

impl From<EsmClass> for u8 {
    fn from(esm_class: EsmClass) -> Self {
        esm_class.to_byte()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_esm_class_default() {
        let esm = EsmClass::default();
        assert_eq!(esm.message_mode, MessageMode::Default);
        assert_eq!(esm.message_type, MessageType::Default);
        assert_eq!(esm.to_byte(), 0x00);
    }

    #[test]
    fn test_esm_class_from_byte() {
        let esm = EsmClass::from_byte(0x00).unwrap();
        assert_eq!(esm.message_mode, MessageMode::Default);
        assert_eq!(esm.message_type, MessageType::Default);

        // Datagram mode
        let esm = EsmClass::from_byte(0x04).unwrap(); // 0b01 << 2
        assert_eq!(esm.message_mode, MessageMode::Datagram);

        // UDHI feature (bit 6 set)
        let esm = EsmClass::from_byte(0x40).unwrap();
        assert!(esm.features.udhi);
    }

    #[test]
    fn test_esm_class_roundtrip() {
        let original = EsmClass::from_byte(0x40 | 0x20 | 0x03 << 2).unwrap();
        let byte_value = original.to_byte();
        let reconstructed = EsmClass::from_byte(byte_value).unwrap();

        assert_eq!(original, reconstructed);
    }

    #[test]
    fn test_esm_class_validation() {
        let valid = EsmClass::default();
        assert!(valid.validate().is_ok());

        let valid_sf = EsmClass::from_byte(0b11 << 2).unwrap();
        assert!(valid_sf.validate().is_ok());
    }

    #[test]
    fn test_esm_class_invalid_byte() {
        let result = EsmClass::from_byte(0xFF); // All bits set - 2-bit mode/type fields are always valid
        assert!(result.is_ok());
        let esm = result.unwrap();
        assert_eq!(esm.message_mode, MessageMode::StoreAndForward);
    }

    #[test]
    fn test_message_mode_conversion() {
        assert_eq!(MessageMode::from_bits(0b00), Some(MessageMode::Default));
        assert_eq!(MessageMode::from_bits(0b01), Some(MessageMode::Datagram));
        assert_eq!(MessageMode::from_bits(0b10), Some(MessageMode::Forward));
        assert_eq!(
            MessageMode::from_bits(0b11),
            Some(MessageMode::StoreAndForward)
        );
        assert_eq!(MessageMode::from_bits(0b100), None); // Invalid
    }

    #[test]
    fn test_store_and_forward_type_conversion() {
        assert_eq!(
            StoreAndForwardType::from_bits(0b00),
            Some(StoreAndForwardType::Default)
        );
        assert_eq!(
            StoreAndForwardType::from_bits(0b01),
            Some(StoreAndForwardType::DeliveryAck)
        );
        assert_eq!(
            StoreAndForwardType::from_bits(0b10),
            Some(StoreAndForwardType::UserAck)
        );
        assert_eq!(
            StoreAndForwardType::from_bits(0b11),
            Some(StoreAndForwardType::BothAck)
        );
        assert_eq!(StoreAndForwardType::from_bits(0b100), None); // Invalid
    }

    #[test]
    fn test_esm_features_bits() {
        let features = EsmFeatures {
            udhi: true,
            reply_path: false,
            status_report_request: true,
        };

        let bits = features.to_bits();
        assert_eq!(bits, 0x40 | 0x10); // Bit 6 + bit 4

        let reconstructed = EsmFeatures::from_bits(bits);
        assert_eq!(features, reconstructed);
    }

    #[test]
    fn test_esm_class_display() {
        let esm = EsmClass::from_byte(0b11 << 2 | 0x40).unwrap();

        let display_str = format!("{esm}");
        assert!(display_str.contains("StoreAndForward"));
    }

    #[test]
    fn test_esm_class_u8_conversions() {
        let esm = EsmClass::from_byte(0x04 | 0x40).unwrap();
        let byte_val: u8 = esm.into();
        let reconstructed = EsmClass::from(byte_val);

        assert_eq!(esm, reconstructed);
    }
}
