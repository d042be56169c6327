use std::borrow::Cow;
use std::collections::HashMap;

use anyhow::Context;

use crate::{ByteBuf, EncodeToBuf, FromBuf, RecordType, IN_CLASS};

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Question<'a> {
    pub qname: Cow<'a, str>,
    pub qtype: RecordType,
    pub qclass: u16,
}

impl<'a> Question<'a> {
    pub fn new(qname: &'a str, qtype: RecordType, qclass: Option<u16>) -> Self {
        Self {
            qname: Cow::Borrowed(qname),
            qtype,
            qclass: qclass.unwrap_or(IN_CLASS),
        }
    }
}

impl FromBuf for Question<'_> {
    fn from_buf(buf: &mut ByteBuf) -> anyhow::Result<Question<'static>> {
        let qname = buf.read_name().context("QNAME is missing")?;
        let qtype: RecordType = buf.read_u16().context("QTYPE is missing")?.into();
        let qclass = buf.read_u16().context("QCLASS is missing")?;

        Ok(Question { qname, qtype, qclass })
    }
}

impl<'a> EncodeToBuf for Question<'a> {
    fn encode_to_buf_with_cache<'cache, 'r: 'cache>(
        &'r self,
        buf: &mut ByteBuf,
        label_cache: Option<&mut HashMap<&'cache str, usize>>,
    ) -> anyhow::Result<usize> {
        let start = buf.len();
        buf.write_name(&self.qname, label_cache).context("writing QNAME")?;
        buf.write_u16(self.qtype.into());
        buf.write_u16(self.qclass);

        Ok(buf.len() - start)
    }
}
