//! Sensor packet fields and the first validity gate
//!
//! Frame layout (byte index, bits numbered LSB = 0):
//!
//! | Byte | Bits | Field                                   |
//! |------|------|-----------------------------------------|
//! | 1    | 7-0  | sensor tag (0x45 for the supported unit)|
//! | 3    | 6-4  | channel id (0-7)                        |
//! | 3    | 3-0  | raw temperature, high nibble            |
//! | 4    | 7-0  | raw temperature, low byte               |
//! | 5    | 7-0  | relative humidity, percent              |
//!
//! Bit 3 of byte 3 belongs to the temperature field, giving a 12-bit raw
//! temperature (0-4095); bit 7 is unused. Bytes 0 and 2 are not interpreted.

use bitfield::bitfield;

use crate::assembler::Frame;
use crate::constants::{
    FRAME_LENGTH, MAX_HUMIDITY, SENSOR_TAG, TEMPERATURE_OFFSET, TEMPERATURE_SCALE,
};
use crate::error::{DecodeError, Result};

const TAG_BYTE: usize = 1;
const CHANNEL_BYTE: usize = 3;
const TEMPERATURE_LOW_BYTE: usize = 4;
const HUMIDITY_BYTE: usize = 5;

/// Largest value of the 12-bit raw temperature field
pub const MAX_RAW_TEMPERATURE: u16 = 0x0FFF;

bitfield! {
    /// Byte 3: channel switch and the temperature high nibble
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct ChannelByte(u8);
    impl Debug;
    pub u8, channel, set_channel: 6, 4;
    pub u8, temperature_high, set_temperature_high: 3, 0;
}

/// Fields extracted from a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SensorPacket {
    /// Channel id as transmitted (0-7)
    pub channel_id: u8,
    /// Sensor model tag
    pub sensor_tag: u8,
    /// Raw 12-bit temperature
    pub raw_temperature: u16,
    /// Raw humidity byte
    pub raw_humidity: u8,
}

impl SensorPacket {
    /// Build a packet from the supported sensor
    pub fn new(channel_id: u8, raw_temperature: u16, raw_humidity: u8) -> Self {
        SensorPacket {
            channel_id,
            sensor_tag: SENSOR_TAG,
            raw_temperature,
            raw_humidity,
        }
    }

    /// Extract fields from a frame without judging them
    pub fn from_frame(frame: &Frame) -> Self {
        let bytes = frame.as_bytes();
        let channel_byte = ChannelByte(bytes[CHANNEL_BYTE]);
        let raw_temperature = (u16::from(channel_byte.temperature_high()) << 8)
            | u16::from(bytes[TEMPERATURE_LOW_BYTE]);

        SensorPacket {
            channel_id: channel_byte.channel(),
            sensor_tag: bytes[TAG_BYTE],
            raw_temperature,
            raw_humidity: bytes[HUMIDITY_BYTE],
        }
    }

    /// Extract fields and apply the sensor tag and humidity gate
    pub fn interpret(frame: &Frame, expected_tag: u8) -> Result<Self> {
        let packet = Self::from_frame(frame);
        packet.validate(expected_tag)?;
        Ok(packet)
    }

    /// Check the sensor tag and humidity range
    pub fn validate(&self, expected_tag: u8) -> Result<()> {
        if self.sensor_tag != expected_tag {
            return Err(DecodeError::foreign_sensor(format!(
                "Tag {:#04x}, expected {:#04x}",
                self.sensor_tag, expected_tag
            )));
        }
        if self.raw_humidity > MAX_HUMIDITY {
            return Err(DecodeError::humidity_out_of_range(format!(
                "Humidity {} exceeds {}",
                self.raw_humidity, MAX_HUMIDITY
            )));
        }
        Ok(())
    }

    /// Encode back into frame bytes; uninterpreted bytes are zero
    pub fn to_frame(&self) -> Frame {
        let mut channel_byte = ChannelByte(0);
        channel_byte.set_channel(self.channel_id);
        channel_byte.set_temperature_high((self.raw_temperature >> 8) as u8);

        let mut bytes = [0u8; FRAME_LENGTH];
        bytes[TAG_BYTE] = self.sensor_tag;
        bytes[CHANNEL_BYTE] = channel_byte.0;
        bytes[TEMPERATURE_LOW_BYTE] = (self.raw_temperature & 0xFF) as u8;
        bytes[HUMIDITY_BYTE] = self.raw_humidity;
        Frame::new(bytes)
    }

    /// Temperature in degrees Celsius
    pub fn temperature_celsius(&self) -> f32 {
        raw_to_celsius(self.raw_temperature)
    }
}

/// Convert a raw temperature to degrees Celsius
pub fn raw_to_celsius(raw: u16) -> f32 {
    TEMPERATURE_SCALE * (f32::from(raw) - f32::from(TEMPERATURE_OFFSET))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_extraction() {
        // channel 2, raw temperature 0x44B = 1099, humidity 11
        let frame = Frame::new([0x12, 0x45, 0x9C, 0x24, 0x4B, 0x0B]);
        let packet = SensorPacket::from_frame(&frame);
        assert_eq!(packet.channel_id, 2);
        assert_eq!(packet.sensor_tag, 0x45);
        assert_eq!(packet.raw_temperature, 1099);
        assert_eq!(packet.raw_humidity, 11);
    }

    #[test]
    fn test_bit_seven_of_channel_byte_ignored() {
        let frame = Frame::new([0, 0x45, 0, 0xF0, 0x00, 50]);
        let packet = SensorPacket::from_frame(&frame);
        assert_eq!(packet.channel_id, 7);
        assert_eq!(packet.raw_temperature, 0);
    }

    #[test]
    fn test_bit_three_of_channel_byte_is_temperature() {
        // channel 0, only bit 3 set: the top bit of the 12-bit temperature
        let frame = Frame::new([0, 0x45, 0, 0x08, 0x00, 50]);
        let packet = SensorPacket::from_frame(&frame);
        assert_eq!(packet.channel_id, 0);
        assert_eq!(packet.raw_temperature, 0x800);

        let frame = Frame::new([0, 0x45, 0, 0x7F, 0xFF, 50]);
        let packet = SensorPacket::from_frame(&frame);
        assert_eq!(packet.channel_id, 7);
        assert_eq!(packet.raw_temperature, MAX_RAW_TEMPERATURE);
    }

    #[test]
    fn test_encode_decode_all_channels() -> Result<()> {
        for channel in 0..=7u8 {
            for raw_temperature in [0u16, 1, 720, 1099, 2048, MAX_RAW_TEMPERATURE] {
                for raw_humidity in [0u8, 11, 100] {
                    let packet = SensorPacket::new(channel, raw_temperature, raw_humidity);
                    let decoded = SensorPacket::interpret(&packet.to_frame(), SENSOR_TAG)?;
                    assert_eq!(decoded, packet);
                }
            }
        }
        Ok(())
    }

    #[test]
    fn test_foreign_tag_discarded() {
        for tag in (0..=u8::MAX).filter(|&t| t != SENSOR_TAG) {
            let mut packet = SensorPacket::new(0, 1000, 50);
            packet.sensor_tag = tag;
            let result = SensorPacket::interpret(&packet.to_frame(), SENSOR_TAG);
            assert!(matches!(result, Err(DecodeError::ForeignSensor(_))));
        }
    }

    #[test]
    fn test_humidity_over_hundred_discarded() {
        for humidity in 101..=u8::MAX {
            let packet = SensorPacket::new(0, 1000, humidity);
            let result = SensorPacket::interpret(&packet.to_frame(), SENSOR_TAG);
            assert!(matches!(result, Err(DecodeError::HumidityOutOfRange(_))));
        }
    }

    #[test]
    fn test_celsius_conversion() {
        assert_eq!(format!("{:.1}", raw_to_celsius(1099)), "21.1");
        assert_eq!(raw_to_celsius(720), 0.0);
        assert!(raw_to_celsius(0) < -40.0);
    }
}
