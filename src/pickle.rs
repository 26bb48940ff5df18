//! Pickle framing for Graphite's pickle receiver
//!
//! A frame is a 4-byte big-endian payload length followed by a protocol 2
//! pickle of a list of `(path, (timestamp, value))` tuples. Only the handful
//! of opcodes needed for that shape are emitted, and no memo entries are
//! written, so the payload is accepted by restricted unpicklers.

use thiserror::Error;

use crate::sample::MetricSample;

const PROTO: u8 = 0x80;
const EMPTY_LIST: u8 = b']';
const MARK: u8 = b'(';
const APPENDS: u8 = b'e';
const BINUNICODE: u8 = b'X';
const BININT: u8 = b'J';
const LONG1: u8 = 0x8a;
const BINFLOAT: u8 = b'G';
const TUPLE2: u8 = 0x86;
const STOP: u8 = b'.';

/// Size of the length prefix in front of every frame
pub const HEADER_LEN: usize = 4;

#[derive(Debug, Error)]
pub enum PickleError {
    #[error("metric path of {0} bytes is too long to encode")]
    PathTooLong(usize),
    #[error("frame payload of {0} bytes exceeds the length prefix")]
    FrameTooLarge(usize),
}

/// Encode samples as a single length-prefixed frame
pub fn encode_frame(samples: &[MetricSample]) -> Result<Vec<u8>, PickleError> {
    let mut frame = vec![0u8; HEADER_LEN];
    encode_payload(samples, &mut frame)?;

    let payload_len = frame.len() - HEADER_LEN;
    let len = u32::try_from(payload_len).map_err(|_| PickleError::FrameTooLarge(payload_len))?;
    frame[..HEADER_LEN].copy_from_slice(&len.to_be_bytes());

    Ok(frame)
}

fn encode_payload(samples: &[MetricSample], buf: &mut Vec<u8>) -> Result<(), PickleError> {
    buf.extend_from_slice(&[PROTO, 2, EMPTY_LIST]);

    if !samples.is_empty() {
        buf.push(MARK);
        for sample in samples {
            write_str(buf, &sample.path)?;
            write_int(buf, sample.timestamp);
            write_float(buf, sample.value);
            buf.push(TUPLE2);
            buf.push(TUPLE2);
        }
        buf.push(APPENDS);
    }

    buf.push(STOP);
    Ok(())
}

fn write_str(buf: &mut Vec<u8>, s: &str) -> Result<(), PickleError> {
    let len = u32::try_from(s.len()).map_err(|_| PickleError::PathTooLong(s.len()))?;
    buf.push(BINUNICODE);
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(s.as_bytes());
    Ok(())
}

fn write_int(buf: &mut Vec<u8>, value: i64) {
    if let Ok(small) = i32::try_from(value) {
        buf.push(BININT);
        buf.extend_from_slice(&small.to_le_bytes());
        return;
    }

    // LONG1: minimal little-endian two's complement
    let mut bytes = value.to_le_bytes().to_vec();
    while bytes.len() > 1 {
        let last = bytes[bytes.len() - 1];
        let sign_bit = bytes[bytes.len() - 2] & 0x80;
        if (last == 0x00 && sign_bit == 0) || (last == 0xff && sign_bit != 0) {
            bytes.pop();
        } else {
            break;
        }
    }
    buf.push(LONG1);
    buf.push(bytes.len() as u8);
    buf.extend_from_slice(&bytes);
}

fn write_float(buf: &mut Vec<u8>, value: f64) {
    buf.push(BINFLOAT);
    buf.extend_from_slice(&value.to_be_bytes());
}

#[cfg(test)]
pub(crate) mod reference {
    //! Minimal unpickler for the subset of opcodes Graphite frames use

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum Value {
        Str(String),
        Int(i64),
        Float(f64),
        Tuple(Vec<Value>),
        List(Vec<Value>),
    }

    fn take<'a>(buf: &'a [u8], pos: &mut usize, n: usize) -> &'a [u8] {
        let slice = &buf[*pos..*pos + n];
        *pos += n;
        slice
    }

    fn load(payload: &[u8]) -> Value {
        let mut stack: Vec<Value> = Vec::new();
        let mut marks: Vec<usize> = Vec::new();
        let mut pos = 0;

        loop {
            let op = take(payload, &mut pos, 1)[0];
            match op {
                PROTO => {
                    assert_eq!(take(payload, &mut pos, 1)[0], 2);
                }
                EMPTY_LIST => stack.push(Value::List(Vec::new())),
                MARK => marks.push(stack.len()),
                APPENDS => {
                    let mark = marks.pop().expect("APPENDS without MARK");
                    let items: Vec<Value> = stack.drain(mark..).collect();
                    match stack.last_mut() {
                        Some(Value::List(list)) => list.extend(items),
                        other => panic!("APPENDS onto {:?}", other),
                    }
                }
                BINUNICODE => {
                    let len = u32::from_le_bytes(take(payload, &mut pos, 4).try_into().unwrap());
                    let bytes = take(payload, &mut pos, len as usize);
                    stack.push(Value::Str(String::from_utf8(bytes.to_vec()).unwrap()));
                }
                BININT => {
                    let v = i32::from_le_bytes(take(payload, &mut pos, 4).try_into().unwrap());
                    stack.push(Value::Int(v as i64));
                }
                LONG1 => {
                    let n = take(payload, &mut pos, 1)[0] as usize;
                    let bytes = take(payload, &mut pos, n);
                    let fill = if bytes[n - 1] & 0x80 != 0 { 0xff } else { 0x00 };
                    let mut full = [fill; 8];
                    full[..n].copy_from_slice(bytes);
                    stack.push(Value::Int(i64::from_le_bytes(full)));
                }
                BINFLOAT => {
                    let v = f64::from_be_bytes(take(payload, &mut pos, 8).try_into().unwrap());
                    stack.push(Value::Float(v));
                }
                TUPLE2 => {
                    let b = stack.pop().unwrap();
                    let a = stack.pop().unwrap();
                    stack.push(Value::Tuple(vec![a, b]));
                }
                STOP => {
                    assert_eq!(pos, payload.len(), "trailing bytes after STOP");
                    return stack.pop().unwrap();
                }
                other => panic!("unexpected opcode {:#x}", other),
            }
        }
    }

    /// Split a byte stream into frames and decode each into `(path, timestamp, value)`
    pub fn decode_frames(mut stream: &[u8]) -> Vec<Vec<(String, i64, f64)>> {
        let mut frames = Vec::new();
        while !stream.is_empty() {
            let len = u32::from_be_bytes(stream[..HEADER_LEN].try_into().unwrap()) as usize;
            let payload = &stream[HEADER_LEN..HEADER_LEN + len];
            stream = &stream[HEADER_LEN + len..];

            let Value::List(items) = load(payload) else {
                panic!("frame payload is not a list");
            };
            let entries = items
                .into_iter()
                .map(|item| match item {
                    Value::Tuple(outer) => match (&outer[0], &outer[1]) {
                        (Value::Str(path), Value::Tuple(inner)) => match (&inner[0], &inner[1]) {
                            (Value::Int(ts), Value::Float(v)) => (path.clone(), *ts, *v),
                            other => panic!("bad datapoint {:?}", other),
                        },
                        other => panic!("bad entry {:?}", other),
                    },
                    other => panic!("bad item {:?}", other),
                })
                .collect();
            frames.push(entries);
        }
        frames
    }
}
