// ABOUTME: Strongly-typed SMPP data coding scheme with encoding validation and character set support
// ABOUTME: Provides compile-time guarantees for data encoding correctness and prevents invalid schemes

use std::fmt;

/// Strongly-typed data coding scheme that enforces SMPP protocol validation
/// Replaces raw u8 values with validated encoding schemes and character sets
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DataCoding {
    /// SMSC Default Alphabet (typically GSM 7-bit)
    #[default]
    SmscDefault,
    /// IA5 (CCITT T.50)/ASCII encoding
    Ascii,
    /// 8-bit binary data (no encoding)
    Binary,
    /// Latin-1 (ISO-8859-1) character set
    Latin1,
    /// UCS-2 (ISO/IEC-10646) Unicode encoding
    Ucs2,
    /// Cyrillic (ISO-8859-5) character set
    Cyrillic,
    /// Latin/Hebrew (ISO-8859-8) character set
    LatinHebrew,
    /// JIS (X 0208-1990) Japanese character set
    Jis,
    /// GSM 7-bit default alphabet with message class
    Gsm7BitWithClass(MessageClass),
    /// UCS-2 with message class
    Ucs2WithClass(MessageClass),
    /// Custom/reserved data coding value
    Custom(u8),
}

impl DataCoding {
    /// Creates a DataCoding from a raw u8 value with validation
    pub fn from_byte(value: u8) -> Self {
        match value {
            0x00 => DataCoding::SmscDefault,
            0x01 => DataCoding::Ascii,
            0x02 => DataCoding::Binary,
            0x03 => DataCoding::Latin1,
            0x04 => DataCoding::Binary, // Duplicate binary encoding in spec
            0x05 => DataCoding::Jis,
            0x06 => DataCoding::Cyrillic,
            0x07 => DataCoding::LatinHebrew,
            0x08 => DataCoding::Ucs2,
            // GSM 7-bit with message class (0xF0-0xF3)
            0xF0 => DataCoding::Gsm7BitWithClass(MessageClass::Flash),
            0xF1 => DataCoding::Gsm7BitWithClass(MessageClass::MobileEquipment),
            0xF2 => DataCoding::Gsm7BitWithClass(MessageClass::SimSpecific),
            0xF3 => DataCoding::Gsm7BitWithClass(MessageClass::TerminalEquipment),
            // UCS-2 with message class (0xF4-0xF7)
            0xF4 => DataCoding::Ucs2WithClass(MessageClass::Flash),
            0xF5 => DataCoding::Ucs2WithClass(MessageClass::MobileEquipment),
            0xF6 => DataCoding::Ucs2WithClass(MessageClass::SimSpecific),
            0xF7 => DataCoding::Ucs2WithClass(MessageClass::TerminalEquipment),
            // All other values are custom/reserved
            _ => DataCoding::Custom(value),
        }
    }

    /// Returns the raw u8 value for wire protocol
    pub fn to_byte(&self) -> u8 {
        match self {
            DataCoding::SmscDefault => 0x00,
            DataCoding::Ascii => 0x01,
            DataCoding::Binary => 0x02,
            DataCoding::Latin1 => 0x03,
            DataCoding::Jis => 0x05,
            DataCoding::Cyrillic => 0x06,
            DataCoding::LatinHebrew => 0x07,
            DataCoding::Ucs2 => 0x08,
            DataCoding::Gsm7BitWithClass(MessageClass::Flash) => 0xF0,
            DataCoding::Gsm7BitWithClass(MessageClass::MobileEquipment) => 0xF1,
            DataCoding::Gsm7BitWithClass(MessageClass::SimSpecific) => 0xF2,
            DataCoding::Gsm7BitWithClass(MessageClass::TerminalEquipment) => 0xF3,
            DataCoding::Ucs2WithClass(MessageClass::Flash) => 0xF4,
            DataCoding::Ucs2WithClass(MessageClass::MobileEquipment) => 0xF5,
            DataCoding::Ucs2WithClass(MessageClass::SimSpecific) => 0xF6,
            DataCoding::Ucs2WithClass(MessageClass::TerminalEquipment) => 0xF7,
            DataCoding::Custom(value) => *value,
        }
    }

    /// Returns true if this encoding uses 16-bit (Unicode) character encoding.
    /// Drives the short_message decode/encode width in session.rs.
    pub fn is_16bit(&self) -> bool {
        matches!(
            self,
            DataCoding::Ucs2 | DataCoding::Ucs2WithClass(_) | DataCoding::Jis
        )
    }

    /// Returns the message class if this coding scheme includes one
    pub fn message_class(&self) -> Option<MessageClass> {
        match self {
            DataCoding::Gsm7BitWithClass(class) | DataCoding::Ucs2WithClass(class) => Some(*class),
            _ => None,
        }
    }

    /// Returns the character set name for this encoding
    pub fn charset_name(&self) -> &'static str {
        match self {
            DataCoding::SmscDefault => "GSM 7-bit Default",
            DataCoding::Ascii => "ASCII/IA5",
            DataCoding::Binary => "Binary",
            DataCoding::Latin1 => "ISO-8859-1",
            DataCoding::Jis => "JIS X 0208-1990",
            DataCoding::Cyrillic => "ISO-8859-5",
            DataCoding::LatinHebrew => "ISO-8859-8",
            DataCoding::Ucs2 | DataCoding::Ucs2WithClass(_) => "UCS-2",
            DataCoding::Gsm7BitWithClass(_) => "GSM 7-bit Default",
            DataCoding::Custom(_) => "Custom/Reserved",
        }
    }
}

/// Message class for SMS delivery
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum MessageClass {
    /// Flash SMS (displayed immediately, not stored)
    Flash,
    /// Mobile Equipment specific message
    MobileEquipment,
    /// SIM-specific message (stored on SIM card)
    SimSpecific,
    /// Terminal Equipment specific message
    TerminalEquipment,
}

impl MessageClass {
    /// Returns a human-readable description of the message class
    pub fn description(&self) -> &'static str {
        match self {
            MessageClass::Flash => "Flash SMS (immediate display)",
            MessageClass::MobileEquipment => "Mobile Equipment specific",
            MessageClass::SimSpecific => "SIM card storage",
            MessageClass::TerminalEquipment => "Terminal Equipment specific",
        }
    }
}

// Display implementation
impl fmt::Display for DataCoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.charset_name())?;
        if let Some(class) = self.message_class() {
            write!(f, " ({})", class.description())?;
        }
        Ok(())
    }
}

impl fmt::Debug for DataCoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataCoding::Custom(value) => write!(f, "DataCoding::Custom(0x{value:02X})"),
            _ => write!(
                f,
                "DataCoding::{} (0x{:02X})",
                self.charset_name().replace(" ", "").replace("-", ""),
                self.to_byte()
            ),
        }
    }
}

// Conversion implementations
impl From<u8> for DataCoding {
    fn from(value: u8) -> Self {
        Self::from_byte(value)
    }
}

impl From<DataCoding> for u8 {
    fn from(data_coding: DataCoding) -> Self {
        data_coding.to_byte()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_coding_basic_types() {
        assert_eq!(DataCoding::SmscDefault.to_byte(), 0x00);
        assert_eq!(DataCoding::Ascii.to_byte(), 0x01);
        assert_eq!(DataCoding::Binary.to_byte(), 0x02);
        assert_eq!(DataCoding::Ucs2.to_byte(), 0x08);
    }

    #[test]
    fn test_data_coding_with_message_class() {
        let flash_gsm = DataCoding::Gsm7BitWithClass(MessageClass::Flash);
        assert_eq!(flash_gsm.to_byte(), 0xF0);
        assert_eq!(flash_gsm.message_class(), Some(MessageClass::Flash));

        let sim_ucs2 = DataCoding::Ucs2WithClass(MessageClass::SimSpecific);
        assert_eq!(sim_ucs2.to_byte(), 0xF6);
        assert_eq!(sim_ucs2.message_class(), Some(MessageClass::SimSpecific));
    }

    #[test]
    fn test_data_coding_from_byte() {
        assert_eq!(DataCoding::from_byte(0x00), DataCoding::SmscDefault);
        assert_eq!(DataCoding::from_byte(0x01), DataCoding::Ascii);
        assert_eq!(DataCoding::from_byte(0x08), DataCoding::Ucs2);
        assert_eq!(
            DataCoding::from_byte(0xF0),
            DataCoding::Gsm7BitWithClass(MessageClass::Flash)
        );

        // Custom/unknown values
        let custom = DataCoding::from_byte(0xFF);
        assert_eq!(custom, DataCoding::Custom(0xFF));
    }

    #[test]
    fn test_data_coding_roundtrip() {
        let original = DataCoding::Ucs2WithClass(MessageClass::MobileEquipment);
        let byte_value = original.to_byte();
        let reconstructed = DataCoding::from_byte(byte_value);
        assert_eq!(original, reconstructed);
    }

    #[test]
    fn test_data_coding_properties() {
        assert!(!DataCoding::SmscDefault.is_16bit());
        assert!(DataCoding::Ucs2.is_16bit());
    }

    #[test]
    fn test_message_class_descriptions() {
        assert_eq!(
            MessageClass::Flash.description(),
            "Flash SMS (immediate display)"
        );
        assert_eq!(MessageClass::SimSpecific.description(), "SIM card storage");
        assert_eq!(
            MessageClass::MobileEquipment.description(),
            "Mobile Equipment specific"
        );
        assert_eq!(
            MessageClass::TerminalEquipment.description(),
            "Terminal Equipment specific"
        );
    }

    #[test]
    fn test_data_coding_display() {
        assert_eq!(format!("{}", DataCoding::SmscDefault), "GSM 7-bit Default");
        assert_eq!(format!("{}", DataCoding::Ascii), "ASCII/IA5");
        assert_eq!(format!("{}", DataCoding::Ucs2), "UCS-2");

        let flash_gsm = DataCoding::Gsm7BitWithClass(MessageClass::Flash);
        assert_eq!(
            format!("{}", flash_gsm),
            "GSM 7-bit Default (Flash SMS (immediate display))"
        );
    }

    #[test]
    fn test_data_coding_charset_names() {
        assert_eq!(DataCoding::SmscDefault.charset_name(), "GSM 7-bit Default");
        assert_eq!(DataCoding::Ascii.charset_name(), "ASCII/IA5");
        assert_eq!(DataCoding::Binary.charset_name(), "Binary");
        assert_eq!(DataCoding::Latin1.charset_name(), "ISO-8859-1");
        assert_eq!(DataCoding::Ucs2.charset_name(), "UCS-2");
        assert_eq!(DataCoding::Custom(0xFF).charset_name(), "Custom/Reserved");
    }

    #[test]
    fn test_u8_conversions() {
        let dc = DataCoding::Ucs2;
        let byte_val: u8 = dc.into();
        let reconstructed = DataCoding::from(byte_val);
        assert_eq!(dc, reconstructed);
    }
}
