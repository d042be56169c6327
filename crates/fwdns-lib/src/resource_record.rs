use std::borrow::Cow;
use std::collections::HashMap;
use std::net::{Ipv4Addr, Ipv6Addr};

use anyhow::Context;

use crate::{ByteBuf, EncodeToBuf, FromBuf};

/// Resource record TYPEs this codec understands beyond the opaque blob.
///
/// RFC3597 allows message compression only inside RDATA of "well-known"
/// types, i.e. the ones written down in RFC1035: of those, CNAME, MX, NS,
/// PTR and SOA carry domain names. It additionally requires decompression
/// support for a legacy set, of which AFSDB, NAPTR and SRV are not obsolete.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum RecordType {
    A,
    NS,
    CNAME,
    SOA,
    PTR,
    MX,
    AFSDB,
    AAAA,
    SRV,
    NAPTR,
    Unknown(u16),
}

impl From<u16> for RecordType {
    fn from(value: u16) -> Self {
        match value {
            1 => RecordType::A,
            2 => RecordType::NS,
            5 => RecordType::CNAME,
            6 => RecordType::SOA,
            12 => RecordType::PTR,
            15 => RecordType::MX,
            18 => RecordType::AFSDB,
            28 => RecordType::AAAA,
            33 => RecordType::SRV,
            35 => RecordType::NAPTR,
            _ => RecordType::Unknown(value),
        }
    }
}

impl From<RecordType> for u16 {
    fn from(value: RecordType) -> Self {
        match value {
            RecordType::A => 1,
            RecordType::NS => 2,
            RecordType::CNAME => 5,
            RecordType::SOA => 6,
            RecordType::PTR => 12,
            RecordType::MX => 15,
            RecordType::AFSDB => 18,
            RecordType::AAAA => 28,
            RecordType::SRV => 33,
            RecordType::NAPTR => 35,
            RecordType::Unknown(rtype) => rtype,
        }
    }
}

/// Typed RDATA layouts for the supported record types.
///
/// Integer fields are big-endian in declaration order; name fields use the
/// domain-name codec. Only names inside CNAME, MX, NS, PTR and SOA may be
/// compressed on encode; AFSDB, NAPTR and SRV names decode pointers but are
/// always written out in full.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum RData<'a> {
    A {
        address: Ipv4Addr,
    },
    AAAA {
        address: Ipv6Addr,
    },
    CNAME {
        cname: Cow<'a, str>,
    },
    MX {
        preference: u16,
        exchange: Cow<'a, str>,
    },
    NS {
        nsdname: Cow<'a, str>,
    },
    PTR {
        ptrdname: Cow<'a, str>,
    },
    SOA {
        mname: Cow<'a, str>,
        rname: Cow<'a, str>,
        serial: u32,
        refresh: u32,
        retry: u32,
        expire: u32,
        minimum: u32,
    },
    AFSDB {
        subtype: u16,
        hostname: Cow<'a, str>,
    },
    NAPTR {
        order: u16,
        preference: u16,
        flags: Cow<'a, str>,
        services: Cow<'a, str>,
        regexp: Cow<'a, str>,
        replacement: Cow<'a, str>,
    },
    SRV {
        priority: u16,
        weight: u16,
        port: u16,
        target: Cow<'a, str>,
    },
}

impl<'a> RData<'a> {
    pub fn record_type(&self) -> RecordType {
        match self {
            RData::A { .. } => RecordType::A,
            RData::AAAA { .. } => RecordType::AAAA,
            RData::CNAME { .. } => RecordType::CNAME,
            RData::MX { .. } => RecordType::MX,
            RData::NS { .. } => RecordType::NS,
            RData::PTR { .. } => RecordType::PTR,
            RData::SOA { .. } => RecordType::SOA,
            RData::AFSDB { .. } => RecordType::AFSDB,
            RData::NAPTR { .. } => RecordType::NAPTR,
            RData::SRV { .. } => RecordType::SRV,
        }
    }

    /// Decode dispatch over the supported TYPEs. An unrecognized TYPE is not
    /// an error: the record stays blob-only.
    pub fn from_buf_with_type(
        buf: &mut ByteBuf<'_>,
        rtype: RecordType,
        rd_length: usize,
    ) -> anyhow::Result<Option<RData<'static>>> {
        Ok(Some(match rtype {
            RecordType::A => {
                if rd_length != 4 {
                    anyhow::bail!("A record: unexpected RDLENGTH {}", rd_length);
                }
                let raw = buf.read_bytes(4).context("A record: ADDRESS is missing")?;
                let address = Ipv4Addr::from(TryInto::<[u8; 4]>::try_into(raw).unwrap());
                RData::A { address }
            }
            RecordType::AAAA => {
                if rd_length != 16 {
                    anyhow::bail!("AAAA record: unexpected RDLENGTH {}", rd_length);
                }
                let raw = buf.read_bytes(16).context("AAAA record: ADDRESS is missing")?;
                let address = Ipv6Addr::from(TryInto::<[u8; 16]>::try_into(raw).unwrap());
                RData::AAAA { address }
            }
            RecordType::CNAME => {
                let cname = buf.read_name().context("CNAME record: CNAME is missing")?;
                RData::CNAME { cname }
            }
            RecordType::MX => {
                let preference = buf.read_u16().context("MX record: PREFERENCE is missing")?;
                let exchange = buf.read_name().context("MX record: EXCHANGE is missing")?;
                RData::MX { preference, exchange }
            }
            RecordType::NS => {
                let nsdname = buf.read_name().context("NS record: NSDNAME is missing")?;
                RData::NS { nsdname }
            }
            RecordType::PTR => {
                let ptrdname = buf.read_name().context("PTR record: PTRDNAME is missing")?;
                RData::PTR { ptrdname }
            }
            RecordType::SOA => {
                let mname = buf.read_name().context("SOA record: MNAME is missing")?;
                let rname = buf.read_name().context("SOA record: RNAME is missing")?;
                RData::SOA {
                    mname,
                    rname,
                    serial: buf.read_u32().context("SOA record: SERIAL is missing")?,
                    refresh: buf.read_u32().context("SOA record: REFRESH is missing")?,
                    retry: buf.read_u32().context("SOA record: RETRY is missing")?,
                    expire: buf.read_u32().context("SOA record: EXPIRE is missing")?,
                    minimum: buf.read_u32().context("SOA record: MINIMUM is missing")?,
                }
            }
            RecordType::AFSDB => {
                let subtype = buf.read_u16().context("AFSDB record: SUBTYPE is missing")?;
                let hostname = buf.read_name().context("AFSDB record: HOSTNAME is missing")?;
                RData::AFSDB { subtype, hostname }
            }
            RecordType::NAPTR => {
                let order = buf.read_u16().context("NAPTR record: ORDER is missing")?;
                let preference = buf.read_u16().context("NAPTR record: PREFERENCE is missing")?;
                let flags = buf
                    .read_character_string()
                    .context("NAPTR record: FLAGS are missing")?;
                let services = buf
                    .read_character_string()
                    .context("NAPTR record: SERVICES are missing")?;
                let regexp = buf
                    .read_character_string()
                    .context("NAPTR record: REGEXP is missing")?;
                let replacement = buf.read_name().context("NAPTR record: REPLACEMENT is missing")?;
                RData::NAPTR {
                    order,
                    preference,
                    flags,
                    services,
                    regexp,
                    replacement,
                }
            }
            RecordType::SRV => {
                let priority = buf.read_u16().context("SRV record: PRIORITY is missing")?;
                let weight = buf.read_u16().context("SRV record: WEIGHT is missing")?;
                let port = buf.read_u16().context("SRV record: PORT is missing")?;
                let target = buf.read_name().context("SRV record: TARGET is missing")?;
                RData::SRV {
                    priority,
                    weight,
                    port,
                    target,
                }
            }
            RecordType::Unknown(_) => return Ok(None),
        }))
    }
}

impl<'a> EncodeToBuf for RData<'a> {
    fn encode_to_buf_with_cache<'cache, 'r: 'cache>(
        &'r self,
        buf: &mut ByteBuf,
        mut label_cache: Option<&mut HashMap<&'cache str, usize>>,
    ) -> anyhow::Result<usize> {
        let start = buf.len();
        match self {
            RData::A { address } => {
                buf.write_bytes(&address.octets());
            }
            RData::AAAA { address } => {
                buf.write_bytes(&address.octets());
            }
            RData::CNAME { cname } => {
                buf.write_name(cname, label_cache)
                    .context("CNAME record: writing CNAME")?;
            }
            RData::MX { preference, exchange } => {
                buf.write_u16(*preference);
                buf.write_name(exchange, label_cache)
                    .context("MX record: writing EXCHANGE")?;
            }
            RData::NS { nsdname } => {
                buf.write_name(nsdname, label_cache)
                    .context("NS record: writing NSDNAME")?;
            }
            RData::PTR { ptrdname } => {
                buf.write_name(ptrdname, label_cache)
                    .context("PTR record: writing PTRDNAME")?;
            }
            RData::SOA {
                mname,
                rname,
                serial,
                refresh,
                retry,
                expire,
                minimum,
            } => {
                buf.write_name(mname, label_cache.as_deref_mut())
                    .context("SOA record: writing MNAME")?;
                buf.write_name(rname, label_cache)
                    .context("SOA record: writing RNAME")?;
                buf.write_u32(*serial);
                buf.write_u32(*refresh);
                buf.write_u32(*retry);
                buf.write_u32(*expire);
                buf.write_u32(*minimum);
            }
            RData::AFSDB { subtype, hostname } => {
                buf.write_u16(*subtype);
                // Decompression-only type: never compress on encode
                buf.write_name(hostname, None)
                    .context("AFSDB record: writing HOSTNAME")?;
            }
            RData::NAPTR {
                order,
                preference,
                flags,
                services,
                regexp,
                replacement,
            } => {
                buf.write_u16(*order);
                buf.write_u16(*preference);
                buf.write_character_string(flags)
                    .context("NAPTR record: writing FLAGS")?;
                buf.write_character_string(services)
                    .context("NAPTR record: writing SERVICES")?;
                buf.write_character_string(regexp)
                    .context("NAPTR record: writing REGEXP")?;
                // Decompression-only type: never compress on encode
                buf.write_name(replacement, None)
                    .context("NAPTR record: writing REPLACEMENT")?;
            }
            RData::SRV {
                priority,
                weight,
                port,
                target,
            } => {
                buf.write_u16(*priority);
                buf.write_u16(*weight);
                buf.write_u16(*port);
                // Decompression-only type: never compress on encode
                buf.write_name(target, None).context("SRV record: writing TARGET")?;
            }
        }

        Ok(buf.len() - start)
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ResourceRecord<'a> {
    pub name: Cow<'a, str>,
    pub rtype: RecordType,
    pub class: u16,
    /// Seconds the record may be cached for
    pub ttl: u32,
    /// The RDATA exactly as it appeared (or will appear) on the wire
    pub rdata: Cow<'a, [u8]>,
    /// Typed view of the RDATA. Takes precedence over the blob on re-encode.
    pub parsed: Option<RData<'a>>,
}

impl<'a> ResourceRecord<'a> {
    pub fn new(name: &'a str, rdata: RData<'a>, ttl: u32, class: Option<u16>) -> Self {
        ResourceRecord {
            name: name.into(),
            rtype: rdata.record_type(),
            class: class.unwrap_or(crate::IN_CLASS),
            ttl,
            rdata: Cow::Borrowed(&[]),
            parsed: Some(rdata),
        }
    }
}

impl FromBuf for ResourceRecord<'_> {
    fn from_buf(buf: &mut ByteBuf<'_>) -> anyhow::Result<ResourceRecord<'static>> {
        let name = buf.read_name().context("NAME is missing")?;
        let rtype: RecordType = buf.read_u16().context("TYPE is missing")?.into();
        let class = buf.read_u16().context("CLASS is missing")?;
        let ttl = buf.read_u32().context("TTL is missing")?;
        let rd_length = buf.read_u16().context("RDLENGTH is missing")? as usize;

        // The blob is captured unconditionally; a typed decode additionally
        // runs over the same bytes when the TYPE is supported
        let rdata_start = buf.pos();
        let rdata = buf
            .peek_bytes(rdata_start, rd_length)
            .context("RDATA is missing")?
            .to_vec();
        let parsed = RData::from_buf_with_type(buf, rtype, rd_length)
            .with_context(|| format!("can't decode RDATA of type {:?}", rtype))?;
        // The typed layout is bounded by RDLENGTH regardless of what it read
        buf.set_pos(rdata_start + rd_length);

        Ok(ResourceRecord {
            name,
            rtype,
            class,
            ttl,
            rdata: rdata.into(),
            parsed,
        })
    }
}

impl<'a> EncodeToBuf for ResourceRecord<'a> {
    fn encode_to_buf_with_cache<'cache, 'r: 'cache>(
        &'r self,
        buf: &mut ByteBuf,
        mut label_cache: Option<&mut HashMap<&'cache str, usize>>,
    ) -> anyhow::Result<usize> {
        let start = buf.len();
        buf.write_name(&self.name, label_cache.as_deref_mut())
            .context("writing NAME")?;
        buf.write_u16(self.rtype.into());
        buf.write_u16(self.class);
        buf.write_u32(self.ttl);

        // RDLENGTH isn't known until the RDATA is written, so write a stub
        // and patch it afterwards
        let rd_length_pos = buf.len();
        buf.write_u16(0);
        let rd_length = match &self.parsed {
            Some(rdata) => rdata
                .encode_to_buf_with_cache(buf, label_cache)
                .context("writing RDATA")?,
            None => {
                buf.write_bytes(&self.rdata);
                self.rdata.len()
            }
        };
        buf.set_u16(rd_length_pos, rd_length as u16)
            .context("writing RDLENGTH")?;

        Ok(buf.len() - start)
    }
}
