use crate::codec::{CodecError, Decodable, Encodable, PduHeader};
use crate::datatypes::{CommandId, CommandStatus};
use bytes::BytesMut;
use std::io::Cursor;

/// enquire_link is used to test the connection between the SMSC and ESME
/// and can be sent by either party. It has no body.
#[derive(Clone, Debug, PartialEq)]
pub struct EnquireLink {
    // pub command_length: u32,
    // pub command_id: CommandId::EnquireLink,
    // EnquireLink always sets the command status to NULL
    // pub command_status: CommandStatus,
    pub sequence_number: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EnquireLinkResponse {
    // pub command_length: u32,
    // pub command_id: CommandId::EnquireLinkResp,
    // EnquireLinkResponse instances always set the command status to ESME_ROK (CommandStatus::Ok)
    //pub command_status: CommandStatus,
    pub sequence_number: u32,
}

impl Decodable for EnquireLink {
    fn command_id() -> CommandId {
        CommandId::EnquireLink
    }

    fn decode(header: PduHeader, buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        Self::validate_header(&header)?;

        use bytes::Buf;
        if buf.has_remaining() {
            return Err(CodecError::FieldValidation {
                field: "enquire_link_body",
                reason: "enquire_link PDU should have no body".to_string(),
            });
        }

        Ok(EnquireLink {
            sequence_number: header.sequence_number,
        })
    }
}

impl Encodable for EnquireLink {
    fn encode(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
        let header = PduHeader {
            command_length: PduHeader::SIZE as u32,
            command_id: CommandId::EnquireLink,
            command_status: CommandStatus::Ok,
            sequence_number: self.sequence_number,
        };
        header.encode(buf)
    }

    fn encoded_size(&self) -> usize {
        PduHeader::SIZE
    }
}

impl Decodable for EnquireLinkResponse {
    fn command_id() -> CommandId {
        CommandId::EnquireLinkResp
    }

    fn decode(header: PduHeader, buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        Self::validate_header(&header)?;

        use bytes::Buf;
        if buf.has_remaining() {
            return Err(CodecError::FieldValidation {
                field: "enquire_link_resp_body",
                reason: "enquire_link_resp PDU should have no body".to_string(),
            });
        }

        Ok(EnquireLinkResponse {
            sequence_number: header.sequence_number,
        })
    }
}

impl Encodable for EnquireLinkResponse {
    fn encode(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
        let header = PduHeader {
            command_length: PduHeader::SIZE as u32,
            command_id: CommandId::EnquireLinkResp,
            command_status: CommandStatus::Ok,
            sequence_number: self.sequence_number,
        };
        header.encode(buf)
    }

    fn encoded_size(&self) -> usize {
        PduHeader::SIZE
    }
}
