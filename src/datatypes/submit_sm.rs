use crate::codec::{
    CodecError, Decodable, Encodable, PduHeader, decode_cstring, decode_u8, encode_cstring,
    encode_u8,
};
use crate::datatypes::numeric_plan_indicator::NumericPlanIndicator;
use crate::datatypes::tlv::Tlv;
use crate::datatypes::{
    CommandId, CommandStatus, DataCoding, DestinationAddr, EsmClass, MessageId, PriorityFlag,
    ScheduleDeliveryTime, ServiceType, ShortMessage, SourceAddr, TypeOfNumber, ValidityPeriod,
};
use bytes::BytesMut;
use std::io::Cursor;

/// This operation is used by an ESME to submit a short message to the SMSC for onward
/// transmission to a specified short message entity (SME).
#[derive(Clone, Debug, PartialEq)]
pub struct SubmitSm {
    // pub command_length: u32,
    // pub command_id: CommandId::SubmitSm,
    pub command_status: CommandStatus,
    pub sequence_number: u32,

    // Mandatory parameters
    pub service_type: ServiceType,
    pub source_addr_ton: TypeOfNumber,
    pub source_addr_npi: NumericPlanIndicator,
    pub source_addr: SourceAddr,
    pub dest_addr_ton: TypeOfNumber,
    pub dest_addr_npi: NumericPlanIndicator,
    pub destination_addr: DestinationAddr,
    pub esm_class: EsmClass,
    pub protocol_id: u8,
    pub priority_flag: PriorityFlag,
    pub schedule_delivery_time: ScheduleDeliveryTime,
    pub validity_period: ValidityPeriod,
    pub registered_delivery: u8,
    pub replace_if_present_flag: u8,
    pub data_coding: DataCoding,
    pub sm_default_msg_id: u8,
    pub sm_length: u8,
    pub short_message: ShortMessage,

    // Optional parameters (TLV format); only the ones the gateway cares about are
    // carried through, the rest of the v3.4 catalogue is accepted but ignored.
    pub user_message_reference: Option<Tlv>,
    pub sar_msg_ref_num: Option<Tlv>,
    pub sar_total_segments: Option<Tlv>,
    pub sar_segment_seqnum: Option<Tlv>,
    pub message_payload: Option<Tlv>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SubmitSmResponse {
    // pub command_length: u32,
    // pub command_id: CommandId::SubmitSmResp,
    pub command_status: CommandStatus,
    pub sequence_number: u32,

    // Body
    pub message_id: MessageId,
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitSmValidationError {
    #[error("sm_length ({sm_length}) does not match short_message length ({message_length})")]
    SmLengthMismatch {
        sm_length: u8,
        message_length: usize,
    },

    #[error("Cannot use both short_message and message_payload - they are mutually exclusive")]
    MutualExclusivityViolation,
}

impl SubmitSm {
    pub fn validate(&self) -> Result<(), SubmitSmValidationError> {
        if self.sm_length as usize != self.short_message.len() as usize {
            return Err(SubmitSmValidationError::SmLengthMismatch {
                sm_length: self.sm_length,
                message_length: self.short_message.len() as usize,
            });
        }

        if !self.short_message.is_empty() && self.message_payload.is_some() {
            return Err(SubmitSmValidationError::MutualExclusivityViolation);
        }

        Ok(())
    }
}

impl Encodable for SubmitSm {
    fn encode(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
        self.validate().map_err(|e| CodecError::FieldValidation {
            field: "submit_sm",
            reason: e.to_string(),
        })?;

        let header = PduHeader {
            command_length: 0,
            command_id: CommandId::SubmitSm,
            command_status: self.command_status,
            sequence_number: self.sequence_number,
        };
        header.encode(buf)?;

        encode_cstring(buf, self.service_type.as_str(), 6);
        encode_u8(buf, self.source_addr_ton as u8);
        encode_u8(buf, self.source_addr_npi as u8);
        encode_cstring(buf, self.source_addr.as_str().unwrap_or(""), 21);
        encode_u8(buf, self.dest_addr_ton as u8);
        encode_u8(buf, self.dest_addr_npi as u8);
        encode_cstring(buf, self.destination_addr.as_str().unwrap_or(""), 21);
        encode_u8(buf, self.esm_class.to_byte());
        encode_u8(buf, self.protocol_id);
        encode_u8(buf, self.priority_flag as u8);
        encode_cstring(buf, self.schedule_delivery_time.as_str().unwrap_or(""), 17);
        encode_cstring(buf, self.validity_period.as_str().unwrap_or(""), 17);
        encode_u8(buf, self.registered_delivery);
        encode_u8(buf, self.replace_if_present_flag);
        encode_u8(buf, self.data_coding.to_byte());
        encode_u8(buf, self.sm_default_msg_id);
        encode_u8(buf, self.sm_length);

        let message_bytes = self.short_message.as_bytes();
        buf.extend_from_slice(&message_bytes[..(self.sm_length as usize).min(message_bytes.len())]);

        for tlv in [
            &self.user_message_reference,
            &self.sar_msg_ref_num,
            &self.sar_total_segments,
            &self.sar_segment_seqnum,
            &self.message_payload,
        ] {
            if let Some(tlv) = tlv {
                tlv.encode(buf)?;
            }
        }

        Ok(())
    }

    fn encoded_size(&self) -> usize {
        let mut size = PduHeader::SIZE;
        size += 6 + 1 + 1 + 21 + 1 + 1 + 21 + 1 + 1 + 1 + 17 + 17 + 1 + 1 + 1 + 1 + 1;
        size += self.sm_length as usize;
        for tlv in [
            &self.user_message_reference,
            &self.sar_msg_ref_num,
            &self.sar_total_segments,
            &self.sar_segment_seqnum,
            &self.message_payload,
        ] {
            if let Some(tlv) = tlv {
                size += tlv.encoded_size();
            }
        }
        size
    }
}

impl Decodable for SubmitSm {
    fn command_id() -> CommandId {
        CommandId::SubmitSm
    }

    fn decode(header: PduHeader, buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        Self::validate_header(&header)?;

        let service_type = ServiceType::from(decode_cstring(buf, 6, "service_type")?.as_str());
        let source_addr_ton = TypeOfNumber::try_from(decode_u8(buf)?).map_err(|_| {
            CodecError::FieldValidation {
                field: "source_addr_ton",
                reason: "invalid type of number".to_string(),
            }
        })?;
        let source_addr_npi = NumericPlanIndicator::try_from(decode_u8(buf)?).map_err(|_| {
            CodecError::FieldValidation {
                field: "source_addr_npi",
                reason: "invalid numbering plan indicator".to_string(),
            }
        })?;
        let source_addr_str = decode_cstring(buf, 21, "source_addr")?;
        let dest_addr_ton = TypeOfNumber::try_from(decode_u8(buf)?).map_err(|_| {
            CodecError::FieldValidation {
                field: "dest_addr_ton",
                reason: "invalid type of number".to_string(),
            }
        })?;
        let dest_addr_npi = NumericPlanIndicator::try_from(decode_u8(buf)?).map_err(|_| {
            CodecError::FieldValidation {
                field: "dest_addr_npi",
                reason: "invalid numbering plan indicator".to_string(),
            }
        })?;
        let destination_addr_str = decode_cstring(buf, 21, "destination_addr")?;
        let esm_class = EsmClass::from(decode_u8(buf)?);
        let protocol_id = decode_u8(buf)?;
        let priority_flag = PriorityFlag::try_from(decode_u8(buf)?).map_err(|_| {
            CodecError::FieldValidation {
                field: "priority_flag",
                reason: "invalid priority flag".to_string(),
            }
        })?;
        let schedule_delivery_time =
            ScheduleDeliveryTime::from(decode_cstring(buf, 17, "schedule_delivery_time")?.as_str());
        let validity_period =
            ValidityPeriod::from(decode_cstring(buf, 17, "validity_period")?.as_str());
        let registered_delivery = decode_u8(buf)?;
        let replace_if_present_flag = decode_u8(buf)?;
        let data_coding = DataCoding::from(decode_u8(buf)?);
        let sm_default_msg_id = decode_u8(buf)?;
        let sm_length = decode_u8(buf)?;

        use bytes::Buf;
        if buf.remaining() < sm_length as usize {
            return Err(CodecError::Incomplete);
        }
        let message_bytes = buf.copy_to_bytes(sm_length as usize);
        let short_message = ShortMessage::new(&message_bytes).map_err(|e| {
            CodecError::FieldValidation {
                field: "short_message",
                reason: e.to_string(),
            }
        })?;

        let source_addr = SourceAddr::from_parsed_string(source_addr_str).map_err(|e| {
            CodecError::FieldValidation {
                field: "source_addr",
                reason: e.to_string(),
            }
        })?;
        let destination_addr =
            DestinationAddr::from_parsed_string(destination_addr_str).map_err(|e| {
                CodecError::FieldValidation {
                    field: "destination_addr",
                    reason: e.to_string(),
                }
            })?;

        // Remaining bytes are optional TLVs; the gateway only needs segmentation TLVs.
        let mut user_message_reference = None;
        let mut sar_msg_ref_num = None;
        let mut sar_total_segments = None;
        let mut sar_segment_seqnum = None;
        let mut message_payload = None;
        while buf.has_remaining() {
            let tlv = Tlv::decode(buf)?;
            match tlv.tag {
                crate::datatypes::tags::USER_MESSAGE_REFERENCE => user_message_reference = Some(tlv),
                crate::datatypes::tags::SAR_MSG_REF_NUM => sar_msg_ref_num = Some(tlv),
                crate::datatypes::tags::SAR_TOTAL_SEGMENTS => sar_total_segments = Some(tlv),
                crate::datatypes::tags::SAR_SEGMENT_SEQNUM => sar_segment_seqnum = Some(tlv),
                crate::datatypes::tags::MESSAGE_PAYLOAD => message_payload = Some(tlv),
                _ => {}
            }
        }

        Ok(SubmitSm {
            command_status: header.command_status,
            sequence_number: header.sequence_number,
            service_type,
            source_addr_ton,
            source_addr_npi,
            source_addr,
            dest_addr_ton,
            dest_addr_npi,
            destination_addr,
            esm_class,
            protocol_id,
            priority_flag,
            schedule_delivery_time,
            validity_period,
            registered_delivery,
            replace_if_present_flag,
            data_coding,
            sm_default_msg_id,
            sm_length,
            short_message,
            user_message_reference,
            sar_msg_ref_num,
            sar_total_segments,
            sar_segment_seqnum,
            message_payload,
        })
    }
}

impl Encodable for SubmitSmResponse {
    fn encode(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
        let header = PduHeader {
            command_length: 0,
            command_id: CommandId::SubmitSmResp,
            command_status: self.command_status,
            sequence_number: self.sequence_number,
        };
        header.encode(buf)?;
        encode_cstring(buf, self.message_id.as_str().unwrap_or(""), 65);
        Ok(())
    }

    fn encoded_size(&self) -> usize {
        PduHeader::SIZE + 65
    }
}

impl Decodable for SubmitSmResponse {
    fn command_id() -> CommandId {
        CommandId::SubmitSmResp
    }

    fn decode(header: PduHeader, buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        Self::validate_header(&header)?;
        let message_id_str = decode_cstring(buf, 65, "message_id")?;
        let message_id = MessageId::from_parsed_string(message_id_str).map_err(|e| {
            CodecError::FieldValidation {
                field: "message_id",
                reason: e.to_string(),
            }
        })?;
        Ok(SubmitSmResponse {
            command_status: header.command_status,
            sequence_number: header.sequence_number,
            message_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SubmitSm {
        SubmitSm {
            command_status: CommandStatus::Ok,
            sequence_number: 7,
            service_type: ServiceType::from(""),
            source_addr_ton: TypeOfNumber::International,
            source_addr_npi: NumericPlanIndicator::Isdn,
            source_addr: SourceAddr::new("15551234567", TypeOfNumber::International).unwrap(),
            dest_addr_ton: TypeOfNumber::International,
            dest_addr_npi: NumericPlanIndicator::Isdn,
            destination_addr: DestinationAddr::new("15557654321", TypeOfNumber::International)
                .unwrap(),
            esm_class: EsmClass::default(),
            protocol_id: 0,
            priority_flag: PriorityFlag::Level0,
            schedule_delivery_time: ScheduleDeliveryTime::from(""),
            validity_period: ValidityPeriod::from(""),
            registered_delivery: 0,
            replace_if_present_flag: 0,
            data_coding: DataCoding::default(),
            sm_default_msg_id: 0,
            sm_length: 11,
            short_message: ShortMessage::from("Hello World"),
            user_message_reference: None,
            sar_msg_ref_num: None,
            sar_total_segments: None,
            sar_segment_seqnum: None,
            message_payload: None,
        }
    }

    #[test]
    fn submit_sm_roundtrip() {
        let original = sample();
        let bytes = original.to_bytes();

        let mut cursor = Cursor::new(bytes.as_ref());
        let header = PduHeader::decode(&mut cursor).unwrap();
        let decoded = SubmitSm::decode(header, &mut cursor).unwrap();

        assert_eq!(original, decoded);
    }

    #[test]
    fn submit_sm_validation_catches_length_mismatch() {
        let mut submit_sm = sample();
        submit_sm.sm_length = 3;
        assert!(matches!(
            submit_sm.validate(),
            Err(SubmitSmValidationError::SmLengthMismatch { .. })
        ));
    }

    #[test]
    fn submit_sm_response_roundtrip() {
        let original = SubmitSmResponse {
            command_status: CommandStatus::Ok,
            sequence_number: 9,
            message_id: MessageId::from("abc123"),
        };
        let bytes = original.to_bytes();

        let mut cursor = Cursor::new(bytes.as_ref());
        let header = PduHeader::decode(&mut cursor).unwrap();
        let decoded = SubmitSmResponse::decode(header, &mut cursor).unwrap();

        assert_eq!(original, decoded);
    }
}
