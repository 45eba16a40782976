use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io::Cursor;

// Import codec traits
use crate::codec::{CodecError, Encodable};

// Standard TLV tag constants per SMPP v3.4 specification
pub mod tags {
    pub const USER_MESSAGE_REFERENCE: u16 = 0x0204;
    pub const SOURCE_PORT: u16 = 0x020A;
    pub const SOURCE_ADDR_SUBMIT: u16 = 0x020B;
    pub const DESTINATION_PORT: u16 = 0x020C;
    pub const DEST_ADDR_SUBMIT: u16 = 0x020D;
    pub const SAR_MSG_REF_NUM: u16 = 0x020E;
    pub const SAR_TOTAL_SEGMENTS: u16 = 0x020F;
    pub const SAR_SEGMENT_SEQNUM: u16 = 0x0210;
    pub const SC_INTERFACE_VERSION: u16 = 0x0211;
    pub const MORE_MESSAGES_TO_SEND: u16 = 0x0426;
    pub const PAYLOAD_TYPE: u16 = 0x0019;
    pub const MESSAGE_PAYLOAD: u16 = 0x0424;
    pub const PRIVACY_INDICATOR: u16 = 0x0201;
    pub const CALLBACK_NUM: u16 = 0x0381;
    pub const CALLBACK_NUM_PRES_IND: u16 = 0x0302;
    pub const CALLBACK_NUM_ATAG: u16 = 0x0303;
    pub const SOURCE_SUBADDRESS: u16 = 0x0202;
    pub const DEST_SUBADDRESS: u16 = 0x0203;
    pub const DISPLAY_TIME: u16 = 0x1201;
    pub const SMS_SIGNAL: u16 = 0x1203;
    pub const MS_VALIDITY: u16 = 0x1204;
    pub const MS_MSG_WAIT_FACILITIES: u16 = 0x1205;
    pub const NUMBER_OF_MESSAGES: u16 = 0x0205;
    pub const ALERT_ON_MSG_DELIVERY: u16 = 0x130C;
    pub const LANGUAGE_INDICATOR: u16 = 0x000D;
    pub const ITS_REPLY_TYPE: u16 = 0x1380;
    pub const ITS_SESSION_INFO: u16 = 0x1383;
    pub const USSD_SERVICE_OP: u16 = 0x0501;

    // SMPP v5.0 TLV tags
    pub const CONGESTION_STATE: u16 = 0x142C;
    pub const BILLING_IDENTIFICATION: u16 = 0x0600;
    pub const SOURCE_NETWORK_ID: u16 = 0x060E;
    pub const DEST_NETWORK_ID: u16 = 0x060F;
    pub const SOURCE_NODE_ID: u16 = 0x060C;
    pub const DEST_NODE_ID: u16 = 0x060D;

    // Additional TLV tags for deliver_sm and other PDUs
    pub const USER_DATA_HEADER: u16 = 0x0005;
    pub const NETWORK_ERROR_CODE: u16 = 0x0423;
    pub const DELIVERY_FAILURE_REASON: u16 = 0x0425;
    pub const ADDITIONAL_STATUS_INFO_TEXT: u16 = 0x001D;
    pub const DPF_RESULT: u16 = 0x0420;
    pub const SET_DPF: u16 = 0x0421;
    pub const MS_AVAILABILITY_STATUS: u16 = 0x0422;
    pub const RECEIPTED_MESSAGE_ID: u16 = 0x001E;
    pub const MESSAGE_STATE: u16 = 0x0427;
}

#[derive(Clone, Debug, PartialEq)]
pub struct Tlv {
    /// The Tag field is used to uniquely identify the particular optional parameter in question.
    pub tag: u16,

    /// The Length field indicates the length of the Value field in octets.
    /// Note that this length does not include the length of the Tag and Length fields.
    pub length: u16,

    /// The Value field contains the actual data for the optional parameter in question.
    pub value: Bytes,
}

// Codec trait implementations for TLV
impl Encodable for Tlv {
    fn encode(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
        buf.put_u16(self.tag);
        buf.put_u16(self.length);
        buf.extend_from_slice(&self.value);
        Ok(())
    }

    fn encoded_size(&self) -> usize {
        4 + self.value.len() // 2 bytes tag + 2 bytes length + value
    }
}

impl Tlv {
    /// Convert TLV to bytes without PDU header (overrides Encodable::to_bytes)
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode(&mut buf).expect("TLV encoding should not fail");
        buf.freeze()
    }

    /// Decode a TLV from the buffer
    pub fn decode(buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        if buf.remaining() < 4 {
            return Err(CodecError::Incomplete);
        }

        let tag = buf.get_u16();
        let length = buf.get_u16();

        if buf.remaining() < length as usize {
            return Err(CodecError::Incomplete);
        }

        let mut value_bytes = vec![0u8; length as usize];
        buf.copy_to_slice(&mut value_bytes);
        let value = Bytes::from(value_bytes);

        Ok(Self { tag, length, value })
    }
}
