use crate::error::{Error, ErrorKind, Result};
use crate::proto::{
    padding_to, Endianness, HeaderField, Type, MAX_ARRAY_LENGTH, MAX_MESSAGE_LENGTH,
    PROTOCOL_VERSION,
};
use crate::signature::Signature;

use super::{Message, MessageKind, Serial};

fn align8(buf: &mut Vec<u8>) {
    let padding = padding_to(8, buf.len());

    for _ in 0..padding {
        buf.push(0);
    }
}

/// Begin a `(yv)` header-field entry: the field code followed by the
/// one-character signature of the variant.
fn field_header(buf: &mut Vec<u8>, field: HeaderField, ty: Type) {
    align8(buf);
    buf.push(field.code());
    buf.push(1);
    buf.push(ty.code());
    buf.push(0);
}

fn string_field(buf: &mut Vec<u8>, endianness: Endianness, field: HeaderField, ty: Type, value: &str) {
    field_header(buf, field, ty);
    endianness.put_u32(buf, value.len() as u32);
    buf.extend_from_slice(value.as_bytes());
    buf.push(0);
}

fn u32_field(buf: &mut Vec<u8>, endianness: Endianness, field: HeaderField, value: u32) {
    field_header(buf, field, Type::UINT32);
    endianness.put_u32(buf, value);
}

fn signature_field(buf: &mut Vec<u8>, field: HeaderField, value: &Signature) {
    field_header(buf, field, Type::SIGNATURE);
    buf.push(value.len() as u8);
    buf.extend_from_slice(value.as_bytes());
    buf.push(0);
}

impl Message {
    /// Serialize the message into a single wire frame, using the given
    /// serial.
    ///
    /// Errors if a header field required for the message kind is absent, or
    /// if a protocol size limit is exceeded.
    pub fn serialize_to_bytes(&self, serial: Serial) -> Result<Vec<u8>> {
        let endianness = self.endianness;
        let body = self.body.get();

        let Ok(body_length) = u32::try_from(body.len()) else {
            return Err(Error::new(ErrorKind::MessageTooLong(u32::MAX)));
        };

        let mut buf = Vec::with_capacity(128 + body.len());

        buf.push(endianness as u8);
        buf.push(self.message_type() as u8);
        buf.push(self.flags.bits());
        buf.push(PROTOCOL_VERSION);
        endianness.put_u32(&mut buf, body_length);
        endianness.put_u32(&mut buf, serial.get());

        let length_at = buf.len();
        endianness.put_u32(&mut buf, 0);
        let start = buf.len();

        match &self.kind {
            MessageKind::MethodCall { path, member } => {
                string_field(
                    &mut buf,
                    endianness,
                    HeaderField::PATH,
                    Type::OBJECT_PATH,
                    path.as_str(),
                );

                if let Some(interface) = &self.interface {
                    string_field(
                        &mut buf,
                        endianness,
                        HeaderField::INTERFACE,
                        Type::STRING,
                        interface,
                    );
                }

                string_field(&mut buf, endianness, HeaderField::MEMBER, Type::STRING, member);
            }
            MessageKind::MethodReturn { reply_serial } => {
                u32_field(
                    &mut buf,
                    endianness,
                    HeaderField::REPLY_SERIAL,
                    reply_serial.get(),
                );
            }
            MessageKind::Error {
                error_name,
                reply_serial,
            } => {
                string_field(
                    &mut buf,
                    endianness,
                    HeaderField::ERROR_NAME,
                    Type::STRING,
                    error_name,
                );
                u32_field(
                    &mut buf,
                    endianness,
                    HeaderField::REPLY_SERIAL,
                    reply_serial.get(),
                );
            }
            MessageKind::Signal { path, member } => {
                let Some(interface) = &self.interface else {
                    return Err(Error::new(ErrorKind::MissingHeaderField(
                        HeaderField::INTERFACE,
                    )));
                };

                string_field(
                    &mut buf,
                    endianness,
                    HeaderField::PATH,
                    Type::OBJECT_PATH,
                    path.as_str(),
                );
                string_field(
                    &mut buf,
                    endianness,
                    HeaderField::INTERFACE,
                    Type::STRING,
                    interface,
                );
                string_field(&mut buf, endianness, HeaderField::MEMBER, Type::STRING, member);
            }
        }

        if !matches!(
            self.kind,
            MessageKind::MethodCall { .. } | MessageKind::Signal { .. }
        ) {
            if let Some(interface) = &self.interface {
                string_field(
                    &mut buf,
                    endianness,
                    HeaderField::INTERFACE,
                    Type::STRING,
                    interface,
                );
            }
        }

        if let Some(destination) = &self.destination {
            string_field(
                &mut buf,
                endianness,
                HeaderField::DESTINATION,
                Type::STRING,
                destination,
            );
        }

        if let Some(sender) = &self.sender {
            string_field(&mut buf, endianness, HeaderField::SENDER, Type::STRING, sender);
        }

        if !self.body.signature().is_empty() {
            signature_field(&mut buf, HeaderField::SIGNATURE, self.body.signature());
        }

        if self.body.fd_count() > 0 {
            u32_field(
                &mut buf,
                endianness,
                HeaderField::UNIX_FDS,
                self.body.fd_count() as u32,
            );
        }

        let header_length = (buf.len() - start) as u32;

        if header_length > MAX_ARRAY_LENGTH {
            return Err(Error::new(ErrorKind::ArrayTooLong(header_length)));
        }

        endianness.put_u32_at(&mut buf, length_at, header_length);
        align8(&mut buf);
        buf.extend_from_slice(body);

        if buf.len() > MAX_MESSAGE_LENGTH as usize {
            return Err(Error::new(ErrorKind::MessageTooLong(buf.len() as u32)));
        }

        Ok(buf)
    }
}
