//! Editable rule and chain descriptions plus the kernel record codec
//!
//! A [`RuleRequest`] is the protocol-agnostic description of one rule,
//! built either by a caller assembling new input or by decoding an
//! existing kernel record. It is consumed by [`RuleRequest::encode`],
//! which produces the binary record handed to the store's
//! insert/append/replace calls; the request itself is never persisted —
//! after a successful mutation the kernel record is the source of
//! truth.

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::core::catalog;
use crate::core::error::CodecError;
use crate::core::record::{
    ENTRY_SIZE, EXT_NAME_LEN, MATCH_SIZE, OFF_DMSK, OFF_DST, OFF_IN_IFACE, OFF_IN_IFACE_MASK,
    OFF_MATCH_DATA, OFF_MATCH_NAME, OFF_MATCH_SIZE, OFF_NEXT_OFFSET, OFF_OUT_IFACE,
    OFF_OUT_IFACE_MASK, OFF_PROTO, OFF_SMSK, OFF_SRC, OFF_TARGET_NAME, OFF_TARGET_OFFSET,
    OFF_TARGET_SIZE, RecordBuilder, RuleRecord, TARGET_SIZE,
};
use crate::core::store::TableHandle;
use crate::validators;

/// Protocol name constants for request construction.
pub const PROTO_TCP: &str = "TCP";
pub const PROTO_UDP: &str = "UDP";
pub const PROTO_ICMP: &str = "ICMP";

/// Optional port-range restrictions of one match block. Ranges are
/// numeric strings as entered; absence means "no port restriction",
/// which the kernel encodes as the full port space, not as a missing
/// match entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleMatch {
    pub src_port_range: Option<(String, String)>,
    pub dst_port_range: Option<(String, String)>,
}

/// Editable description of one firewall rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleRequest {
    /// 0-based position in the chain's rule list. Positions at or past
    /// the current rule count mean append.
    pub index: usize,
    pub src_ip: Option<String>,
    pub src_mask: Option<String>,
    pub dst_ip: Option<String>,
    pub dst_mask: Option<String>,
    /// Transport protocol name; must resolve through the catalog.
    pub proto: String,
    pub in_iface: Option<String>,
    pub out_iface: Option<String>,
    /// Match blocks, zero or one per rule in practice; the codec only
    /// emits TCP/UDP match blocks.
    pub matches: Vec<RuleMatch>,
    /// Kernel verdict target name.
    pub target: String,
}

impl Default for RuleRequest {
    fn default() -> Self {
        Self {
            index: 0,
            src_ip: None,
            src_mask: None,
            dst_ip: None,
            dst_mask: None,
            proto: PROTO_TCP.to_string(),
            in_iface: None,
            out_iface: None,
            matches: Vec::new(),
            target: "ACCEPT".to_string(),
        }
    }
}

/// A chain-creation request. Chains only need a name; there is no
/// binary codec on this path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainRequest {
    pub chain_name: String,
}

impl ChainRequest {
    pub fn new(chain_name: impl Into<String>) -> Self {
        Self {
            chain_name: chain_name.into(),
        }
    }
}

fn parse_addr(
    field: &'static str,
    value: Option<&str>,
    default: Ipv4Addr,
) -> Result<Ipv4Addr, CodecError> {
    match value {
        Some(value) => validators::validate_ipv4(value).map_err(|_| CodecError::BadAddress {
            field,
            value: value.to_string(),
        }),
        None => Ok(default),
    }
}

fn parse_ports(range: Option<&(String, String)>) -> Result<(u16, u16), CodecError> {
    match range {
        Some((low, high)) => {
            validators::validate_port_range_str(low, high).map_err(CodecError::BadPort)
        }
        None => Ok((0, u16::MAX)),
    }
}

impl RuleRequest {
    /// Serializes this request into a complete, self-contained one-rule
    /// kernel record, ready for an insert/append/replace call.
    ///
    /// All field validation happens here, before anything touches the
    /// store. An absent address encodes as "any" (all-zero) and an
    /// absent mask as "match-all" (all-ones), so an absent mask and an
    /// explicit all-ones mask are observably identical after encoding.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] for an unresolvable protocol, match
    /// blocks on a non-TCP/UDP protocol, or a malformed address, port
    /// or interface field.
    pub fn encode(&self) -> Result<RuleRecord, CodecError> {
        let proto_id =
            catalog::proto_to_id(&self.proto).ok_or_else(|| {
                CodecError::UnknownProtocol(self.proto.clone())
            })?;

        let match_tag: &[u8] = match self.proto.as_str() {
            PROTO_TCP => b"tcp",
            PROTO_UDP => b"udp",
            _ if self.matches.is_empty() => b"",
            _ => return Err(CodecError::UnsupportedMatchProto(self.proto.clone())),
        };

        // Record layout, computed before any write: the record is a
        // complete one-rule list node, so next_offset is its total size.
        let target_offset = ENTRY_SIZE + MATCH_SIZE * self.matches.len();
        let size = target_offset + TARGET_SIZE;
        if size > usize::from(u16::MAX) {
            return Err(CodecError::Malformed(format!(
                "{} match blocks overflow the record's 16-bit offsets",
                self.matches.len()
            )));
        }

        let mut builder = RecordBuilder::new(size);
        builder.put_u16(OFF_TARGET_OFFSET, target_offset as u16);
        builder.put_u16(OFF_NEXT_OFFSET, size as u16);
        builder.put_u16(OFF_PROTO, u16::from(proto_id));

        builder.put_addr(
            OFF_SRC,
            parse_addr("src_ip", self.src_ip.as_deref(), Ipv4Addr::UNSPECIFIED)?,
        );
        builder.put_addr(
            OFF_SMSK,
            parse_addr("src_mask", self.src_mask.as_deref(), Ipv4Addr::BROADCAST)?,
        );
        builder.put_addr(
            OFF_DST,
            parse_addr("dst_ip", self.dst_ip.as_deref(), Ipv4Addr::UNSPECIFIED)?,
        );
        builder.put_addr(
            OFF_DMSK,
            parse_addr("dst_mask", self.dst_mask.as_deref(), Ipv4Addr::BROADCAST)?,
        );

        if let Some(iface) = self.in_iface.as_deref() {
            validators::validate_interface(iface).map_err(CodecError::BadInterface)?;
            builder.put_bytes(OFF_IN_IFACE, iface.as_bytes());
            // mask covers the name plus its terminating null, exactly
            builder.fill(OFF_IN_IFACE_MASK, iface.len() + 1, 0xFF);
        }
        if let Some(iface) = self.out_iface.as_deref() {
            validators::validate_interface(iface).map_err(CodecError::BadInterface)?;
            builder.put_bytes(OFF_OUT_IFACE, iface.as_bytes());
            builder.fill(OFF_OUT_IFACE_MASK, iface.len() + 1, 0xFF);
        }

        for (i, rule_match) in self.matches.iter().enumerate() {
            let off = ENTRY_SIZE + MATCH_SIZE * i;
            builder.put_u16(off + OFF_MATCH_SIZE, MATCH_SIZE as u16);
            builder.put_bytes(off + OFF_MATCH_NAME, match_tag);

            let (src_low, src_high) = parse_ports(rule_match.src_port_range.as_ref())?;
            let (dst_low, dst_high) = parse_ports(rule_match.dst_port_range.as_ref())?;
            let data = off + OFF_MATCH_DATA;
            builder.put_u16(data, src_low);
            builder.put_u16(data + 2, src_high);
            builder.put_u16(data + 4, dst_low);
            builder.put_u16(data + 6, dst_high);
        }

        builder.put_u16(target_offset + OFF_TARGET_SIZE, TARGET_SIZE as u16);
        // The name field is only written for an empty or
        // catalog-recognized target; an unrecognized non-empty target
        // leaves the field zero-filled.
        if (self.target.is_empty() || catalog::is_valid_target(&self.target))
            && self.target.len() <= EXT_NAME_LEN
        {
            builder.put_bytes(target_offset + OFF_TARGET_NAME, self.target.as_bytes());
        }

        builder.into_record()
    }

    /// Reconstructs a request from a kernel record at `index` in its
    /// chain. The target name is read through the owning handle's
    /// target accessor; everything else comes from the record bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Malformed`] when the record's match-block
    /// chain does not land exactly on `target_offset`.
    pub fn decode(
        handle: &dyn TableHandle,
        record: &RuleRecord,
        index: usize,
    ) -> Result<Self, CodecError> {
        let proto_id = u8::try_from(record.proto()).ok();
        let proto = proto_id
            .and_then(catalog::id_to_proto)
            .unwrap_or("UNKNOWN")
            .to_string();
        let transport = matches!(proto.as_str(), PROTO_TCP | PROTO_UDP);

        let matches = record
            .match_blocks()?
            .into_iter()
            .map(|block| {
                if transport {
                    RuleMatch {
                        src_port_range: Some((
                            block.src_ports.0.to_string(),
                            block.src_ports.1.to_string(),
                        )),
                        dst_port_range: Some((
                            block.dst_ports.0.to_string(),
                            block.dst_ports.1.to_string(),
                        )),
                    }
                } else {
                    RuleMatch::default()
                }
            })
            .collect();

        let target = if record.has_target() {
            handle.target_name(record)
        } else {
            String::new()
        };

        Ok(Self {
            index,
            src_ip: Some(record.src().to_string()),
            src_mask: Some(record.src_mask().to_string()),
            dst_ip: Some(record.dst().to_string()),
            dst_mask: Some(record.dst_mask().to_string()),
            proto,
            in_iface: record.in_iface(),
            out_iface: record.out_iface(),
            matches,
            target,
        })
    }

    /// One-line summary for chain listings: addresses, protocol, and
    /// when present the first match's port ranges and the target.
    pub fn summary(&self) -> String {
        let any = || "0.0.0.0".to_string();
        let all = || "255.255.255.255".to_string();

        let mut line = format!(
            "SRC: {}/{}, DST: {}/{} | PROTO: {}",
            self.src_ip.clone().unwrap_or_else(any),
            self.src_mask.clone().unwrap_or_else(all),
            self.dst_ip.clone().unwrap_or_else(any),
            self.dst_mask.clone().unwrap_or_else(all),
            self.proto,
        );

        if let Some(rule_match) = self.matches.first() {
            if let Some((low, high)) = &rule_match.src_port_range {
                line.push_str(&format!(" | SPT: {low}:{high}"));
            }
            if let Some((low, high)) = &rule_match.dst_port_range {
                line.push_str(&format!(" | DPT: {low}:{high}"));
            }
        }

        if !self.target.is_empty() {
            line.push_str(&format!(" | TARGET: {}", self.target));
        }

        line
    }
}
