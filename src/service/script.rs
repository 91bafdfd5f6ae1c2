//! Voice-markup scripts served to the call provider.
//!
//! A script is a `<Response>` root holding one `<Say>` per line, in order.
//! Empty lines stay in as empty `<Say>` elements; the provider treats them as
//! a short silence before the first real sentence.

use std::fmt::Write;

pub const SCRIPT_CONTENT_TYPE: &str = "text/xml";

const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechSegment {
    pub text: String,
    pub voice: String,
}

/// Ordered speech segments; immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VoiceScript {
    segments: Vec<SpeechSegment>,
}

impl VoiceScript {
    pub fn new<S: AsRef<str>>(lines: &[S], voice: &str) -> Self {
        let segments = lines
            .iter()
            .map(|line| SpeechSegment {
                text: line.as_ref().to_string(),
                voice: voice.to_string(),
            })
            .collect();
        Self { segments }
    }

    pub fn segments(&self) -> &[SpeechSegment] {
        &self.segments
    }

    /// Serializes to the indented markup document. Infallible: every string
    /// is escaped, so no input can break the document.
    pub fn to_xml(&self) -> String {
        let mut out = String::with_capacity(64 + self.segments.len() * 48);
        out.push_str(XML_DECLARATION);
        out.push('\n');
        if self.segments.is_empty() {
            out.push_str("<Response></Response>");
            return out;
        }
        out.push_str("<Response>\n");
        for segment in &self.segments {
            out.push_str("  <Say");
            if !segment.voice.is_empty() {
                let _ = write!(out, " voice=\"{}\"", escape(&segment.voice));
            }
            let _ = writeln!(out, ">{}</Say>", escape(&segment.text));
        }
        out.push_str("</Response>");
        out
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.to_xml().into_bytes()
    }
}

/// Builds and serializes a script in one step.
pub fn generate_xml<S: AsRef<str>>(lines: &[S], voice: &str) -> Vec<u8> {
    VoiceScript::new(lines, voice).into_bytes()
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            // Control characters other than tab/newline/CR are not legal XML 1.0.
            c if c.is_control() && !matches!(c, '\t' | '\n' | '\r') => {}
            c => out.push(c),
        }
    }
    out
}
