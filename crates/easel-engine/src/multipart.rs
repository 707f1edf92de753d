use uuid::Uuid;

const BOUNDARY_PREFIX: &str = "----EaselBoundary";
const CRLF: &[u8] = b"\r\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        filename: String,
        content_type: String,
        bytes: Vec<u8>,
    },
}

impl Part {
    pub fn name(&self) -> &str {
        match self {
            Self::Text { name, .. } | Self::File { name, .. } => name,
        }
    }

    fn payload(&self) -> &[u8] {
        match self {
            Self::Text { value, .. } => value.as_bytes(),
            Self::File { bytes, .. } => bytes,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MultipartBuilder {
    parts: Vec<Part>,
}

impl MultipartBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: &str, value: impl Into<String>) -> Self {
        self.parts.push(Part::Text {
            name: header_safe(name),
            value: value.into(),
        });
        self
    }

    pub fn file(
        mut self,
        name: &str,
        filename: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Self {
        self.parts.push(Part::File {
            name: header_safe(name),
            filename: header_safe(filename),
            content_type: header_safe(content_type),
            bytes,
        });
        self
    }

    pub fn build(self) -> MultipartBody {
        self.build_with(random_boundary)
    }

    /// Draws boundaries from `next_boundary` until one appears in no part.
    pub fn build_with(self, mut next_boundary: impl FnMut() -> String) -> MultipartBody {
        let boundary = loop {
            let candidate = next_boundary();
            if !self
                .parts
                .iter()
                .any(|part| contains(part.payload(), candidate.as_bytes()))
            {
                break candidate;
            }
            tracing::debug!("multipart boundary collided with part content; regenerating");
        };
        let bytes = encode(&boundary, &self.parts);
        MultipartBody {
            boundary,
            parts: self.parts,
            bytes,
        }
    }
}

/// Encoded `multipart/form-data` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartBody {
    boundary: String,
    parts: Vec<Part>,
    bytes: Vec<u8>,
}

impl MultipartBody {
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    pub fn text_value(&self, name: &str) -> Option<&str> {
        self.parts.iter().find_map(|part| match part {
            Part::Text { name: key, value } if key == name => Some(value.as_str()),
            _ => None,
        })
    }

    pub fn file(&self, name: &str) -> Option<&Part> {
        self.parts
            .iter()
            .find(|part| matches!(part, Part::File { .. }) && part.name() == name)
    }
}

fn random_boundary() -> String {
    format!("{BOUNDARY_PREFIX}{}", Uuid::new_v4().simple())
}

fn encode(boundary: &str, parts: &[Part]) -> Vec<u8> {
    let mut out = Vec::new();
    for part in parts {
        out.extend_from_slice(format!("--{boundary}").as_bytes());
        out.extend_from_slice(CRLF);
        match part {
            Part::Text { name, .. } => {
                out.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"").as_bytes(),
                );
                out.extend_from_slice(CRLF);
            }
            Part::File {
                name,
                filename,
                content_type,
                ..
            } => {
                out.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\""
                    )
                    .as_bytes(),
                );
                out.extend_from_slice(CRLF);
                out.extend_from_slice(format!("Content-Type: {content_type}").as_bytes());
                out.extend_from_slice(CRLF);
            }
        }
        out.extend_from_slice(CRLF);
        out.extend_from_slice(part.payload());
        out.extend_from_slice(CRLF);
    }
    out.extend_from_slice(format!("--{boundary}--").as_bytes());
    out.extend_from_slice(CRLF);
    out
}

fn header_safe(value: &str) -> String {
    value
        .chars()
        .filter(|ch| *ch != '\r' && *ch != '\n')
        .collect::<String>()
        .replace('"', "%22")
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty()
        && haystack.len() >= needle.len()
        && haystack
            .windows(needle.len())
            .any(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_text_and_file_parts_with_crlf_framing() {
        let body = MultipartBuilder::new()
            .text("prompt", "a cat")
            .file("image", "image.png", "image/png", vec![1, 2, 3])
            .build_with(|| "XYZ".to_string());

        let mut expected = Vec::new();
        expected.extend_from_slice(
            b"--XYZ\r\nContent-Disposition: form-data; name=\"prompt\"\r\n\r\na cat\r\n",
        );
        expected.extend_from_slice(
            b"--XYZ\r\nContent-Disposition: form-data; name=\"image\"; filename=\"image.png\"\r\nContent-Type: image/png\r\n\r\n",
        );
        expected.extend_from_slice(&[1, 2, 3]);
        expected.extend_from_slice(b"\r\n--XYZ--\r\n");

        assert_eq!(body.as_bytes(), expected.as_slice());
        assert_eq!(body.content_type(), "multipart/form-data; boundary=XYZ");
        assert_eq!(body.text_value("prompt"), Some("a cat"));
        assert!(body.file("image").is_some());
        assert!(body.file("prompt").is_none());
    }

    #[test]
    fn boundary_is_regenerated_when_it_collides_with_content() {
        let mut candidates = vec!["fresh".to_string(), "clash".to_string()];
        let body = MultipartBuilder::new()
            .text("prompt", "this text contains clash inside")
            .build_with(|| candidates.pop().unwrap_or_default());
        assert_eq!(body.boundary(), "fresh");
    }

    #[test]
    fn random_boundaries_differ_per_body() {
        let first = MultipartBuilder::new().text("a", "b").build();
        let second = MultipartBuilder::new().text("a", "b").build();
        assert!(first.boundary().starts_with(BOUNDARY_PREFIX));
        assert_ne!(first.boundary(), second.boundary());
    }

    #[test]
    fn header_values_cannot_break_framing() {
        let body = MultipartBuilder::new()
            .text("na\"me\r\n", "v")
            .build_with(|| "B".to_string());
        assert_eq!(body.parts()[0].name(), "na%22me");
    }
}
