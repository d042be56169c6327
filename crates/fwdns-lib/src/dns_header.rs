use anyhow::Context;

use crate::ByteBuf;

#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum QueryOpcode {
    /// Standard query
    #[default]
    Query,
    /// Inverse query
    IQuery,
    /// Status request
    Status,
    /// 3-15 opcodes, carried verbatim
    Unknown(u8),
}

impl From<u8> for QueryOpcode {
    fn from(value: u8) -> Self {
        match value {
            0 => QueryOpcode::Query,
            1 => QueryOpcode::IQuery,
            2 => QueryOpcode::Status,
            opcode => QueryOpcode::Unknown(opcode),
        }
    }
}

impl From<QueryOpcode> for u8 {
    fn from(value: QueryOpcode) -> Self {
        match value {
            QueryOpcode::Query => 0,
            QueryOpcode::IQuery => 1,
            QueryOpcode::Status => 2,
            QueryOpcode::Unknown(opcode) => opcode,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum ResponseCode {
    #[default]
    NoError,
    /// Server was unable to interpret the query
    FormatError,
    /// Server was unable to process the query due to an internal error
    ServerFailure,
    /// Domain name referenced in the query doesn't exist
    NameError,
    /// Requested kind of query is not supported by the server
    NotImplemented,
    /// Server refuses to complete the specified operation
    Refused,
    /// 6-15 codes, carried verbatim
    Unknown(u8),
}

impl From<u8> for ResponseCode {
    fn from(value: u8) -> Self {
        match value {
            0 => ResponseCode::NoError,
            1 => ResponseCode::FormatError,
            2 => ResponseCode::ServerFailure,
            3 => ResponseCode::NameError,
            4 => ResponseCode::NotImplemented,
            5 => ResponseCode::Refused,
            code => ResponseCode::Unknown(code),
        }
    }
}

impl From<ResponseCode> for u8 {
    fn from(value: ResponseCode) -> Self {
        match value {
            ResponseCode::NoError => 0,
            ResponseCode::FormatError => 1,
            ResponseCode::ServerFailure => 2,
            ResponseCode::NameError => 3,
            ResponseCode::NotImplemented => 4,
            ResponseCode::Refused => 5,
            ResponseCode::Unknown(code) => code,
        }
    }
}

/// The bit-packed FLAGS word. Wire order, MSB to LSB:
/// QR(1) OPCODE(4) AA(1) TC(1) RD(1) RA(1) Z(3) RCODE(4).
#[derive(Debug, PartialEq, Eq, Default, Clone, Copy)]
pub struct DnsFlags {
    /// Query/Response
    pub is_response: bool,
    /// Kind of query
    pub opcode: QueryOpcode,
    /// Set by the server. Indicates whether it is authoritative
    pub is_authoritative: bool,
    /// Set when the message didn't fit in a single datagram
    pub truncation: bool,
    /// Set by the sender. Asks for recursive resolution
    pub recursion_desired: bool,
    /// Set by the server. Indicates whether recursion is available
    pub recursion_available: bool,
    /// Reserved bits
    pub z: [bool; 3],
    /// Set by the server. Status of the response
    pub response_code: ResponseCode,
}

impl DnsFlags {
    /// Packs the flags, accumulating shifted contributions from RCODE up
    /// through QR. The field order is a wire-format contract.
    pub fn as_u16(&self) -> u16 {
        let mut raw = u8::from(self.response_code) as u16;
        raw |= ((self.z[0] as u16) << 2 | (self.z[1] as u16) << 1 | self.z[2] as u16) << 4;
        raw |= (self.recursion_available as u16) << 7;
        raw |= (self.recursion_desired as u16) << 8;
        raw |= (self.truncation as u16) << 9;
        raw |= (self.is_authoritative as u16) << 10;
        raw |= (u8::from(self.opcode) as u16) << 11;
        raw |= (self.is_response as u16) << 15;
        raw
    }

    pub fn from_u16(raw: u16) -> Self {
        DnsFlags {
            is_response: (raw >> 15) & 0b1 == 1,
            opcode: (((raw >> 11) & 0b1111) as u8).into(),
            is_authoritative: (raw >> 10) & 0b1 == 1,
            truncation: (raw >> 9) & 0b1 == 1,
            recursion_desired: (raw >> 8) & 0b1 == 1,
            recursion_available: (raw >> 7) & 0b1 == 1,
            z: [
                (raw >> 6) & 0b1 == 1,
                (raw >> 5) & 0b1 == 1,
                (raw >> 4) & 0b1 == 1,
            ],
            response_code: ((raw & 0b1111) as u8).into(),
        }
    }
}

/// Per-section entry counts. Derived from the section lengths at encode time
/// and read off the wire at decode time; the header never stores them.
#[derive(Debug, PartialEq, Eq, Default, Clone, Copy)]
pub struct SectionCounts {
    pub questions: u16,
    pub answers: u16,
    pub authorities: u16,
    pub additionals: u16,
}

#[derive(Debug, PartialEq, Eq, Default, Clone, Copy)]
pub struct DnsHeader {
    /// Correlation token chosen by the query issuer and echoed verbatim
    /// by the responder.
    pub id: u16,
    pub flags: DnsFlags,
}

impl DnsHeader {
    pub fn new(id: u16) -> Self {
        DnsHeader {
            id,
            flags: DnsFlags::default(),
        }
    }

    /// Reads the six-word header, returning the section counts so the caller
    /// knows how many entries of each kind to parse next.
    pub fn read(buf: &mut ByteBuf) -> anyhow::Result<(Self, SectionCounts)> {
        let id = buf.read_u16().context("ID is missing")?;
        let flags = DnsFlags::from_u16(buf.read_u16().context("FLAGS are missing")?);
        let counts = SectionCounts {
            questions: buf.read_u16().context("QDCOUNT is missing")?,
            answers: buf.read_u16().context("ANCOUNT is missing")?,
            authorities: buf.read_u16().context("NSCOUNT is missing")?,
            additionals: buf.read_u16().context("ARCOUNT is missing")?,
        };
        Ok((DnsHeader { id, flags }, counts))
    }

    /// Writes the six-word header. Counts are passed in explicitly so they
    /// can never drift from the section lengths they were derived from.
    pub fn write(&self, buf: &mut ByteBuf, counts: &SectionCounts) {
        buf.write_u16(self.id);
        buf.write_u16(self.flags.as_u16());
        buf.write_u16(counts.questions);
        buf.write_u16(counts.answers);
        buf.write_u16(counts.authorities);
        buf.write_u16(counts.additionals);
    }
}
