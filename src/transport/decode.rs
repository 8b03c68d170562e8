use std::mem;

/// Turns byte chunks into text without splitting multi-byte characters across reads.
///
/// Incomplete trailing sequences are carried into the next call; invalid bytes
/// become U+FFFD.
#[derive(Debug, Default, Clone)]
pub struct Utf8Decoder {
    carry: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&mut self, bytes: &[u8]) -> String {
        let mut data = mem::take(&mut self.carry);
        data.extend_from_slice(bytes);
        let mut out = String::with_capacity(data.len());
        let mut rest: &[u8] = &data;
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    break;
                }
                Err(err) => {
                    let (valid, after) = rest.split_at(err.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match err.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => {
                            self.carry = after.to_vec();
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    /// Drop any carried partial sequence.
    pub fn reset(&mut self) {
        self.carry.clear();
    }

    pub fn has_carry(&self) -> bool {
        !self.carry.is_empty()
    }
}
