//! Replies the proxy builds itself rather than relaying.

use hickory_proto::error::ProtoResult;
use hickory_proto::op::{Header, Message, MessageType, ResponseCode};
use hickory_proto::serialize::binary::{BinDecodable, BinDecoder};

/// Size of the fixed DNS header.
pub const HEADER_LEN: usize = 12;

/// A reply to `query` carrying `code`, its ID, opcode, RD flag and question.
pub fn reply_with_code(query: &Message, code: ResponseCode) -> Message {
    let mut reply = Message::new();
    reply
        .set_id(query.id())
        .set_message_type(MessageType::Response)
        .set_op_code(query.op_code())
        .set_recursion_desired(query.recursion_desired())
        .set_recursion_available(true)
        .set_response_code(code)
        .add_queries(query.queries().iter().cloned());
    reply
}

/// Header-and-question copy of `response` with TC set, for a UDP client
/// whose payload limit the full answer exceeds.
pub fn truncated_reply(query: &Message, response: &Message) -> Message {
    let mut reply = Message::new();
    reply
        .set_id(response.id())
        .set_message_type(MessageType::Response)
        .set_op_code(response.op_code())
        .set_authoritative(response.authoritative())
        .set_truncated(true)
        .set_recursion_desired(response.recursion_desired())
        .set_recursion_available(response.recursion_available())
        .set_response_code(response.response_code())
        .add_queries(query.queries().iter().cloned());
    reply
}

/// FORMERR for a message that does not parse but has a readable header.
///
/// Returns `None` when not even the header can be read, or when the message
/// is itself a response; such input is dropped.
pub fn format_error(raw: &[u8]) -> Option<Vec<u8>> {
    if raw.len() < HEADER_LEN {
        return None;
    }
    let header = Header::read(&mut BinDecoder::new(raw)).ok()?;
    if header.message_type() == MessageType::Response {
        return None;
    }

    let mut reply = Message::error_msg(header.id(), header.op_code(), ResponseCode::FormErr);
    reply.set_recursion_desired(header.recursion_desired());
    reply.to_vec().ok()
}

/// Serialize a locally built reply.
pub fn encode(message: &Message) -> ProtoResult<Vec<u8>> {
    message.to_vec()
}
