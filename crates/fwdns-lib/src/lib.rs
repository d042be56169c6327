//! RFC1035 wire codec for DNS messages: bit-packed header flags, label-based
//! domain names with message compression, and typed RDATA layouts for the
//! well-known record types.

#[cfg(test)]
pub(crate) mod test_utils;

mod buf;
mod dns_header;
mod question;
mod resource_record;

pub use buf::{ByteBuf, EncodeToBuf, FromBuf, WireError, MAX_LABEL_LENGTH, MAX_POINTER_OFFSET};
pub use dns_header::{DnsFlags, DnsHeader, QueryOpcode, ResponseCode, SectionCounts};
pub use question::Question;
pub use resource_record::{RData, RecordType, ResourceRecord};

use std::collections::HashMap;

use anyhow::Context;

/// The Internet CLASS
pub const IN_CLASS: u16 = 1;

/// A full DNS message. Section entry counts are never stored: they are
/// derived from the section lengths at encode time and read off the wire at
/// decode time.
#[derive(Debug, PartialEq, Eq, Default, Clone)]
pub struct DnsPacket<'a> {
    pub header: DnsHeader,
    pub questions: Vec<Question<'a>>,
    pub answers: Vec<ResourceRecord<'a>>,
    pub authorities: Vec<ResourceRecord<'a>>,
    pub additionals: Vec<ResourceRecord<'a>>,
}

impl<'a> DnsPacket<'a> {
    pub fn new(header: DnsHeader) -> Self {
        DnsPacket {
            header,
            ..Default::default()
        }
    }

    fn section_counts(&self) -> anyhow::Result<SectionCounts> {
        Ok(SectionCounts {
            questions: u16::try_from(self.questions.len()).context("too many questions")?,
            answers: u16::try_from(self.answers.len()).context("too many answer RRs")?,
            authorities: u16::try_from(self.authorities.len()).context("too many authority RRs")?,
            additionals: u16::try_from(self.additionals.len()).context("too many additional RRs")?,
        })
    }
}

impl FromBuf for DnsPacket<'_> {
    fn from_buf(buf: &mut ByteBuf<'_>) -> anyhow::Result<DnsPacket<'static>> {
        let (header, counts) = DnsHeader::read(buf).context("header parsing error")?;

        let mut questions = Vec::with_capacity(counts.questions as usize);
        for idx in 0..counts.questions {
            let question =
                Question::from_buf(buf).with_context(|| format!("question parsing error at idx {}", idx))?;
            questions.push(question);
        }

        let mut answers = Vec::with_capacity(counts.answers as usize);
        for idx in 0..counts.answers {
            let answer = ResourceRecord::from_buf(buf)
                .with_context(|| format!("answer RR parsing error at idx {}", idx))?;
            answers.push(answer);
        }

        let mut authorities = Vec::with_capacity(counts.authorities as usize);
        for idx in 0..counts.authorities {
            let authority = ResourceRecord::from_buf(buf)
                .with_context(|| format!("authority RR parsing error at idx {}", idx))?;
            authorities.push(authority);
        }

        let mut additionals = Vec::with_capacity(counts.additionals as usize);
        for idx in 0..counts.additionals {
            let additional = ResourceRecord::from_buf(buf)
                .with_context(|| format!("additional RR parsing error at idx {}", idx))?;
            additionals.push(additional);
        }

        Ok(DnsPacket {
            header,
            questions,
            answers,
            authorities,
            additionals,
        })
    }
}

impl<'a> EncodeToBuf for DnsPacket<'a> {
    fn encode_to_buf_with_cache<'cache, 'r: 'cache>(
        &'r self,
        buf: &mut ByteBuf,
        mut label_cache: Option<&mut HashMap<&'cache str, usize>>,
    ) -> anyhow::Result<usize> {
        let start = buf.len();

        self.header.write(buf, &self.section_counts()?);

        self.questions.iter().enumerate().try_for_each(|(idx, question)| {
            question
                .encode_to_buf_with_cache(buf, label_cache.as_deref_mut())
                .map(drop)
                .with_context(|| format!("writing question at idx {}", idx))
        })?;
        self.answers.iter().enumerate().try_for_each(|(idx, answer)| {
            answer
                .encode_to_buf_with_cache(buf, label_cache.as_deref_mut())
                .map(drop)
                .with_context(|| format!("writing answer RR at idx {}", idx))
        })?;
        self.authorities.iter().enumerate().try_for_each(|(idx, authority)| {
            authority
                .encode_to_buf_with_cache(buf, label_cache.as_deref_mut())
                .map(drop)
                .with_context(|| format!("writing authority RR at idx {}", idx))
        })?;
        self.additionals.iter().enumerate().try_for_each(|(idx, additional)| {
            additional
                .encode_to_buf_with_cache(buf, label_cache.as_deref_mut())
                .map(drop)
                .with_context(|| format!("writing additional RR at idx {}", idx))
        })?;

        Ok(buf.len() - start)
    }

    /// Encoding a whole message always uses a fresh compression dictionary
    /// scoped to that message.
    fn encode_to_buf(&self, buf: &mut ByteBuf) -> anyhow::Result<usize> {
        let mut label_cache = HashMap::new();
        self.encode_to_buf_with_cache(buf, Some(&mut label_cache))
    }
}
