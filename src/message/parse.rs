use crate::body::Body;
use crate::body_buf::BodyBuf;
use crate::error::{Error, ErrorKind, Result};
use crate::object_path::ObjectPath;
use crate::proto::{
    padding_to, Endianness, Flags, HeaderField, MessageType, FRAME_PROLOGUE_LENGTH,
    MAX_ARRAY_LENGTH, MAX_MESSAGE_LENGTH, PROTOCOL_VERSION,
};
use crate::signature::Signature;

use super::{Message, MessageKind, Serial};

impl Message {
    /// Calculate the total frame length from the first sixteen bytes of a
    /// frame: the fixed header and the header-field array length.
    ///
    /// Errors if the prologue is malformed or the frame would exceed the
    /// maximum message size.
    pub(crate) fn frame_length(prologue: &[u8]) -> Result<usize> {
        if prologue.len() < FRAME_PROLOGUE_LENGTH {
            return Err(Error::new(ErrorKind::BufferUnderflow));
        }

        let endianness = Endianness::from_byte(prologue[0])?;
        let body_length = endianness.get_u32(&prologue[4..8]);
        let field_length = endianness.get_u32(&prologue[12..16]);

        if field_length > MAX_ARRAY_LENGTH {
            return Err(Error::new(ErrorKind::ArrayTooLong(field_length)));
        }

        let fields_end = FRAME_PROLOGUE_LENGTH + field_length as usize;
        let total = fields_end + padding_to(8, fields_end) + body_length as usize;

        if total > MAX_MESSAGE_LENGTH as usize {
            return Err(Error::new(ErrorKind::MessageTooLong(total as u32)));
        }

        Ok(total)
    }

    /// Parse a single message out of `data`, which must hold a whole frame.
    ///
    /// Returns the message and the number of bytes consumed. File
    /// descriptors received out-of-band are attached separately by the
    /// connection.
    pub fn parse_from_bytes(data: &[u8]) -> Result<(Self, usize)> {
        let total = Self::frame_length(data)?;

        if data.len() < total {
            return Err(Error::new(ErrorKind::BufferUnderflow));
        }

        let endianness = Endianness::from_byte(data[0])?;
        let message_type = MessageType::from_byte(data[1])?;
        let flags = Flags::from_bits_truncate(data[2]);

        if data[3] != PROTOCOL_VERSION {
            return Err(Error::new(ErrorKind::InvalidProtocolVersion(data[3])));
        }

        let body_length = endianness.get_u32(&data[4..8]) as usize;
        let serial = endianness.get_u32(&data[8..12]);
        let serial = Serial::from_u32(serial).ok_or(ErrorKind::ZeroSerial)?;
        let field_length = endianness.get_u32(&data[12..16]) as usize;
        let fields_end = FRAME_PROLOGUE_LENGTH + field_length;

        let mut path = None;
        let mut interface = None;
        let mut member = None;
        let mut error_name = None;
        let mut reply_serial = None;
        let mut destination = None;
        let mut sender = None;
        let mut signature = Signature::empty();
        let mut unix_fds = 0;

        let mut st = Body::with_bounds(data, FRAME_PROLOGUE_LENGTH, fields_end, endianness);

        while !st.is_empty() {
            // Each (yv) entry is aligned to 8 bytes.
            st.align(8)?;
            let field = HeaderField::new(st.load::<u8>()?);
            let sig = st.load::<&Signature>()?;

            match (field, sig.as_bytes()) {
                (HeaderField::PATH, b"o") => {
                    path = Some(st.load::<&ObjectPath>()?);
                }
                (HeaderField::INTERFACE, b"s") => {
                    interface = Some(st.load::<&str>()?);
                }
                (HeaderField::MEMBER, b"s") => {
                    member = Some(st.load::<&str>()?);
                }
                (HeaderField::ERROR_NAME, b"s") => {
                    error_name = Some(st.load::<&str>()?);
                }
                (HeaderField::REPLY_SERIAL, b"u") => {
                    let number = st.load::<u32>()?;
                    reply_serial =
                        Some(Serial::from_u32(number).ok_or(ErrorKind::ZeroSerial)?);
                }
                (HeaderField::DESTINATION, b"s") => {
                    destination = Some(st.load::<&str>()?);
                }
                (HeaderField::SENDER, b"s") => {
                    sender = Some(st.load::<&str>()?);
                }
                (HeaderField::SIGNATURE, b"g") => {
                    signature = st.load::<&Signature>()?;
                }
                (HeaderField::UNIX_FDS, b"u") => {
                    unix_fds = st.load::<u32>()?;
                }
                (_, _) => {
                    st.skip(sig)?;
                }
            }
        }

        let kind = match message_type {
            MessageType::MethodCall => {
                let path = path.ok_or(ErrorKind::MissingHeaderField(HeaderField::PATH))?;
                let member = member.ok_or(ErrorKind::MissingHeaderField(HeaderField::MEMBER))?;

                MessageKind::MethodCall {
                    path: path.to_owned(),
                    member: member.into(),
                }
            }
            MessageType::MethodReturn => {
                let reply_serial = reply_serial
                    .ok_or(ErrorKind::MissingHeaderField(HeaderField::REPLY_SERIAL))?;

                MessageKind::MethodReturn { reply_serial }
            }
            MessageType::Error => {
                let error_name = error_name
                    .ok_or(ErrorKind::MissingHeaderField(HeaderField::ERROR_NAME))?;
                let reply_serial = reply_serial
                    .ok_or(ErrorKind::MissingHeaderField(HeaderField::REPLY_SERIAL))?;

                MessageKind::Error {
                    error_name: error_name.into(),
                    reply_serial,
                }
            }
            MessageType::Signal => {
                let path = path.ok_or(ErrorKind::MissingHeaderField(HeaderField::PATH))?;

                if interface.is_none() {
                    return Err(Error::new(ErrorKind::MissingHeaderField(
                        HeaderField::INTERFACE,
                    )));
                }

                let member = member.ok_or(ErrorKind::MissingHeaderField(HeaderField::MEMBER))?;

                MessageKind::Signal {
                    path: path.to_owned(),
                    member: member.into(),
                }
            }
        };

        let body_start = fields_end + padding_to(8, fields_end);

        // Padding between the field array and the body must be zero.
        for &byte in &data[fields_end..body_start] {
            if byte != 0 {
                return Err(Error::new(ErrorKind::NonZeroPadding));
            }
        }

        let body = data[body_start..body_start + body_length].to_vec();
        let body = BodyBuf::from_raw_parts(endianness, body, signature.to_owned());

        let message = Message {
            kind,
            serial: Some(serial),
            flags,
            endianness,
            interface: interface.map(Box::from),
            destination: destination.map(Box::from),
            sender: sender.map(Box::from),
            body,
            declared_fds: unix_fds,
            valid: true,
        };

        Ok((message, total))
    }
}
