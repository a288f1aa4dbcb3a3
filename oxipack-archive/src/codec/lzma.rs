//! In-process LZMA stream compressor.

use super::{CodecProgress, StreamCompressor};
use crate::container::{ArtifactHeader, PropertyBytes};
use oxipack_core::error::Result;
use oxipack_lzma::{CoderProperties, LzmaDecoder, LzmaEncoder, LzmaLevel};
use std::io::{Read, Write};

/// LZMA with the properties the installer artifacts always used:
/// lc=3, lp=0, pb=2 and a level-dependent dictionary.
#[derive(Debug, Clone)]
pub struct LzmaCompressor {
    encoder: LzmaEncoder,
}

impl LzmaCompressor {
    /// Create a compressor for a level, optionally overriding the dictionary.
    pub fn new(level: LzmaLevel, dict_size: Option<u32>) -> Self {
        let encoder = LzmaEncoder::new(level);
        let encoder = match dict_size {
            Some(size) => encoder.with_dict_size(size),
            None => encoder,
        };
        Self { encoder }
    }

    /// Configured dictionary size.
    pub fn dict_size(&self) -> u32 {
        self.encoder.dict_size()
    }
}

impl Default for LzmaCompressor {
    fn default() -> Self {
        Self::new(LzmaLevel::DEFAULT, None)
    }
}

impl StreamCompressor for LzmaCompressor {
    fn name(&self) -> &str {
        "lzma"
    }

    fn encode(
        &self,
        input: &[u8],
        mut out: &mut dyn Write,
        progress: CodecProgress<'_>,
    ) -> Result<PropertyBytes> {
        self.encoder
            .encode_with_progress(input, &mut out, |done| progress(done))?;
        let properties = CoderProperties {
            props: self.encoder.properties(),
            dict_size: self.encoder.dict_size_for(input.len()),
        };
        Ok(properties.to_bytes())
    }

    fn decode(
        &self,
        header: &ArtifactHeader,
        input: &mut dyn Read,
        mut out: &mut dyn Write,
        progress: CodecProgress<'_>,
    ) -> Result<()> {
        let properties = CoderProperties::from_bytes(&header.properties)?;
        let decoder = LzmaDecoder::new(
            input,
            properties.props,
            properties.dict_size,
            header.length,
        )?;
        let consumed = decoder.decode_with_progress(&mut out, |done| progress(done))?;
        tracing::debug!(consumed, length = header.length, "lzma payload decoded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_through_trait() {
        let codec: Box<dyn StreamCompressor> = Box::new(LzmaCompressor::default());
        let data = b"entry stream bytes, entry stream bytes, entry stream bytes";

        let mut payload = Vec::new();
        let mut seen = 0;
        let properties = codec
            .encode(data, &mut payload, &mut |done| {
                seen = done;
                Ok(())
            })
            .unwrap();
        assert_eq!(seen, data.len() as u64);

        let header = ArtifactHeader {
            properties,
            length: data.len() as u64,
        };
        let mut restored = Vec::new();
        codec
            .decode(&header, &mut &payload[..], &mut restored, &mut |_| Ok(()))
            .unwrap();
        assert_eq!(restored, data);
    }

    #[test]
    fn test_dict_override() {
        let codec = LzmaCompressor::new(LzmaLevel::DEFAULT, Some(1 << 20));
        assert_eq!(codec.dict_size(), 1 << 20);
    }
}
