use std::borrow::Cow;
use std::net::{Ipv4Addr, Ipv6Addr};

use proptest::collection::vec;
use proptest::prelude::*;

use crate::{DnsFlags, Question, RData, RecordType, ResourceRecord};

prop_compose! {
    pub fn arb_flags()(
        is_response: bool,
        opcode in 0..16u8,
        is_authoritative: bool,
        truncation: bool,
        recursion_desired: bool,
        recursion_available: bool,
        z: [bool; 3],
        response_code in 0..16u8,
    ) -> DnsFlags {
        DnsFlags {
            is_response,
            opcode: opcode.into(),
            is_authoritative,
            truncation,
            recursion_desired,
            recursion_available,
            z,
            response_code: response_code.into(),
        }
    }
}

prop_compose! {
    pub fn arb_question()(qname in arb_qname(), qtype in arb_record_type(), qclass: u16) -> Question<'static> {
        Question { qname, qtype, qclass }
    }
}

prop_compose! {
    pub fn arb_unknown_resource_record()(
        name in arb_qname(),
        rdata in vec(any::<u8>(), 0..40),
        class: u16,
        ttl: u32,
    ) -> ResourceRecord<'static> {
        ResourceRecord {
            name,
            // Reserved QTYPE, guaranteed to stay outside the typed table
            rtype: RecordType::Unknown(0xfffe),
            class,
            ttl,
            rdata: rdata.into(),
            parsed: None,
        }
    }
}

pub fn arb_record_type() -> impl Strategy<Value = RecordType> {
    // `From<u16>` folds every value into its canonical variant, so the full
    // range is safe to sample from
    any::<u16>().prop_map(RecordType::from)
}

pub fn arb_rdata() -> impl Strategy<Value = RData<'static>> {
    prop_oneof![
        any::<Ipv4Addr>().prop_map(|address| RData::A { address }),
        any::<Ipv6Addr>().prop_map(|address| RData::AAAA { address }),
        arb_qname().prop_map(|cname| RData::CNAME { cname }),
        (any::<u16>(), arb_qname()).prop_map(|(preference, exchange)| RData::MX { preference, exchange }),
        arb_qname().prop_map(|nsdname| RData::NS { nsdname }),
        arb_qname().prop_map(|ptrdname| RData::PTR { ptrdname }),
        (arb_qname(), arb_qname(), any::<[u32; 5]>()).prop_map(|(mname, rname, counters)| RData::SOA {
            mname,
            rname,
            serial: counters[0],
            refresh: counters[1],
            retry: counters[2],
            expire: counters[3],
            minimum: counters[4],
        }),
        (any::<u16>(), arb_qname()).prop_map(|(subtype, hostname)| RData::AFSDB { subtype, hostname }),
        (
            any::<u16>(),
            any::<u16>(),
            arb_character_string(),
            arb_character_string(),
            arb_character_string(),
            arb_qname(),
        )
            .prop_map(|(order, preference, flags, services, regexp, replacement)| RData::NAPTR {
                order,
                preference,
                flags,
                services,
                regexp,
                replacement,
            }),
        (any::<u16>(), any::<u16>(), any::<u16>(), arb_qname()).prop_map(|(priority, weight, port, target)| {
            RData::SRV {
                priority,
                weight,
                port,
                target,
            }
        }),
    ]
}

pub fn arb_qname() -> impl Strategy<Value = Cow<'static, str>> {
    proptest::string::string_regex(r"(([a-z0-9][a-z0-9-]{1,14}\.){1,3}[a-z0-9]{2,15})|")
        .expect("regex should be valid")
        .prop_map(Cow::Owned)
}

fn arb_character_string() -> impl Strategy<Value = Cow<'static, str>> {
    proptest::string::string_regex(r"[a-zA-Z0-9+!@]{0,20}")
        .expect("regex should be valid")
        .prop_map(Cow::Owned)
}
