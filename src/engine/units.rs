use bytes::BytesMut;

/// Reassembles arbitrarily fragmented pipe output into newline-terminated units.
///
/// Some interpreter wrappers flush stderr one character at a time; the fragments
/// are concatenated here so the log bus always sees whole lines.
#[derive(Debug, Default)]
pub struct UnitAssembler {
    buf: BytesMut,
}

impl UnitAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every unit completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut units = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line = self.buf.split_to(pos + 1);
            if let Some(unit) = to_unit(&line[..pos]) {
                units.push(unit);
            }
        }
        units
    }

    /// Flush a trailing unit that was not newline-terminated.
    pub fn finish(&mut self) -> Option<String> {
        let rest = self.buf.split();
        to_unit(&rest)
    }
}

// Blank lines carry nothing to classify.
fn to_unit(bytes: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim_end_matches('\r');
    if text.trim().is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}
