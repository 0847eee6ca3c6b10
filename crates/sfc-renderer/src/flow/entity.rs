use super::cookie::NO_COOKIE;
use super::tables::LogicalTable;
use serde::Serialize;
use sfc_types::{MacAddress, MplsLabel, NodeId, PathId, ServiceIndex, VlanId};
use std::fmt;
use std::net::Ipv4Addr;

/// Kind of a match field, in canonical match-key order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchKind {
    InPort,
    EthSrc,
    EthDst,
    EtherType,
    VlanPresent,
    VlanId,
    MplsLabel,
    IpProto,
    Ipv4Src,
    Ipv4Dst,
    Dscp,
    L4DstPort,
    ArpOp,
    TunnelGpeNextProto,
    NshSpi,
    NshSi,
    NshC1,
    Metadata,
}

/// A typed match condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "field", content = "value", rename_all = "kebab-case")]
pub enum MatchField {
    InPort(u32),
    EthSrc(MacAddress),
    EthDst(MacAddress),
    EtherType(u16),
    /// Any 802.1Q tag present.
    VlanPresent,
    VlanId(VlanId),
    MplsLabel(MplsLabel),
    IpProto(u8),
    Ipv4Src(Ipv4Addr),
    Ipv4Dst(Ipv4Addr),
    Dscp(u8),
    L4DstPort(u16),
    ArpOp(u16),
    TunnelGpeNextProto(u8),
    NshSpi(PathId),
    NshSi(ServiceIndex),
    NshC1(Ipv4Addr),
    Metadata(u64),
}

impl MatchField {
    pub fn kind(&self) -> MatchKind {
        match self {
            Self::InPort(_) => MatchKind::InPort,
            Self::EthSrc(_) => MatchKind::EthSrc,
            Self::EthDst(_) => MatchKind::EthDst,
            Self::EtherType(_) => MatchKind::EtherType,
            Self::VlanPresent => MatchKind::VlanPresent,
            Self::VlanId(_) => MatchKind::VlanId,
            Self::MplsLabel(_) => MatchKind::MplsLabel,
            Self::IpProto(_) => MatchKind::IpProto,
            Self::Ipv4Src(_) => MatchKind::Ipv4Src,
            Self::Ipv4Dst(_) => MatchKind::Ipv4Dst,
            Self::Dscp(_) => MatchKind::Dscp,
            Self::L4DstPort(_) => MatchKind::L4DstPort,
            Self::ArpOp(_) => MatchKind::ArpOp,
            Self::TunnelGpeNextProto(_) => MatchKind::TunnelGpeNextProto,
            Self::NshSpi(_) => MatchKind::NshSpi,
            Self::NshSi(_) => MatchKind::NshSi,
            Self::NshC1(_) => MatchKind::NshC1,
            Self::Metadata(_) => MatchKind::Metadata,
        }
    }
}

impl fmt::Display for MatchField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InPort(p) => write!(f, "in_port={}", p),
            Self::EthSrc(m) => write!(f, "dl_src={}", m),
            Self::EthDst(m) => write!(f, "dl_dst={}", m),
            Self::EtherType(t) => write!(f, "dl_type={:#06x}", t),
            Self::VlanPresent => write!(f, "vlan_tci=0x1000/0x1000"),
            Self::VlanId(v) => write!(f, "vlan_vid={:#06x}", v.match_vid()),
            Self::MplsLabel(l) => write!(f, "mpls_label={}", l),
            Self::IpProto(p) => write!(f, "nw_proto={}", p),
            Self::Ipv4Src(ip) => write!(f, "nw_src={}", ip),
            Self::Ipv4Dst(ip) => write!(f, "nw_dst={}", ip),
            Self::Dscp(d) => write!(f, "ip_dscp={}", d),
            Self::L4DstPort(p) => write!(f, "tp_dst={}", p),
            Self::ArpOp(op) => write!(f, "arp_op={}", op),
            Self::TunnelGpeNextProto(np) => write!(f, "tun_gpe_np={:#04x}", np),
            Self::NshSpi(path) => write!(f, "nsp={}", path),
            Self::NshSi(index) => write!(f, "nsi={}", index),
            Self::NshC1(ip) => write!(f, "nshc1={}", ip),
            Self::Metadata(m) => write!(f, "metadata={:#x}", m),
        }
    }
}

/// A set of match conditions, at most one per [`MatchKind`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FlowMatch {
    fields: Vec<MatchField>,
}

impl FlowMatch {
    /// The match-any match.
    pub fn any() -> Self {
        Self::default()
    }

    /// Adds a field, replacing any field of the same kind.
    pub fn with(mut self, field: MatchField) -> Self {
        self.set(field);
        self
    }

    pub fn set(&mut self, field: MatchField) {
        match self.fields.iter_mut().find(|f| f.kind() == field.kind()) {
            Some(existing) => *existing = field,
            None => self.fields.push(field),
        }
    }

    pub fn get(&self, kind: MatchKind) -> Option<&MatchField> {
        self.fields.iter().find(|f| f.kind() == kind)
    }

    pub fn contains(&self, kind: MatchKind) -> bool {
        self.get(kind).is_some()
    }

    pub fn is_any(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &[MatchField] {
        &self.fields
    }

    /// Canonical, insertion-order independent rendering of the match.
    pub fn match_key(&self) -> String {
        if self.fields.is_empty() {
            return "any".to_string();
        }
        let mut sorted: Vec<&MatchField> = self.fields.iter().collect();
        sorted.sort_by_key(|f| f.kind());
        sorted
            .iter()
            .map(|f| f.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl FromIterator<MatchField> for FlowMatch {
    fn from_iter<I: IntoIterator<Item = MatchField>>(iter: I) -> Self {
        let mut m = FlowMatch::any();
        for field in iter {
            m.set(field);
        }
        m
    }
}

/// Actions and instructions of a flow, applied in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "action", content = "value", rename_all = "kebab-case")]
pub enum Action {
    Output(u32),
    OutputInPort,
    OutputController,
    /// Resubmit to a physical table.
    Resubmit(u8),
    PushVlan,
    PopVlan,
    SetVlanId(VlanId),
    PushMpls,
    PopMpls,
    SetMplsLabel(MplsLabel),
    SetEthSrc(MacAddress),
    SetEthDst(MacAddress),
    SetTunnelIpv4Dst(Ipv4Addr),
    PushNsh,
    PopNsh,
    /// Copy NSH context header 1 into the tunnel destination.
    MoveNshC1ToTunnelDst,
    /// Answer ARP requests on behalf of the given MAC.
    ArpResponder(MacAddress),
    SetDscp(u8),
    WriteMetadata(u64),
    /// Continue in a physical table.
    GotoTable(u8),
    Drop,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Output(p) => write!(f, "output:{}", p),
            Self::OutputInPort => write!(f, "in_port"),
            Self::OutputController => write!(f, "controller"),
            Self::Resubmit(t) => write!(f, "resubmit(,{})", t),
            Self::PushVlan => write!(f, "push_vlan"),
            Self::PopVlan => write!(f, "pop_vlan"),
            Self::SetVlanId(v) => write!(f, "set_vlan_vid:{}", v),
            Self::PushMpls => write!(f, "push_mpls"),
            Self::PopMpls => write!(f, "pop_mpls"),
            Self::SetMplsLabel(l) => write!(f, "set_mpls_label:{}", l),
            Self::SetEthSrc(m) => write!(f, "mod_dl_src:{}", m),
            Self::SetEthDst(m) => write!(f, "mod_dl_dst:{}", m),
            Self::SetTunnelIpv4Dst(ip) => write!(f, "set_tun_dst:{}", ip),
            Self::PushNsh => write!(f, "push_nsh"),
            Self::PopNsh => write!(f, "pop_nsh"),
            Self::MoveNshC1ToTunnelDst => write!(f, "move:nshc1->tun_dst"),
            Self::ArpResponder(m) => write!(f, "arp_responder(sha={:#014x})", m.to_u64()),
            Self::SetDscp(d) => write!(f, "set_dscp:{}", d),
            Self::WriteMetadata(m) => write!(f, "write_metadata:{:#x}", m),
            Self::GotoTable(t) => write!(f, "goto_table:{}", t),
            Self::Drop => write!(f, "drop"),
        }
    }
}

/// Identity of a flow on a device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FlowKey {
    pub node: NodeId,
    /// Physical table id.
    pub table: u8,
    pub match_key: String,
}

impl FlowKey {
    /// Flow id used toward the store, unique per node and table.
    pub fn flow_id(&self) -> String {
        format!("sfc-{}-{}", self.table, self.match_key)
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.node, self.table, self.match_key)
    }
}

/// A match/action rule for one device table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlowEntity {
    pub node: NodeId,
    /// Physical table id after remapping.
    pub table: u8,
    pub logical_table: LogicalTable,
    pub priority: u16,
    pub matches: FlowMatch,
    pub actions: Vec<Action>,
    pub cookie: u64,
    /// Seconds of inactivity before the device expires the flow; 0 = never.
    pub idle_timeout: u16,
    pub hard_timeout: u16,
}

impl FlowEntity {
    pub fn new(node: NodeId, logical_table: LogicalTable, table: u8) -> Self {
        Self {
            node,
            table,
            logical_table,
            priority: 0,
            matches: FlowMatch::any(),
            actions: Vec::new(),
            cookie: NO_COOKIE,
            idle_timeout: 0,
            hard_timeout: 0,
        }
    }

    pub fn with_priority(mut self, priority: u16) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_match(mut self, field: MatchField) -> Self {
        self.matches.set(field);
        self
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    pub fn with_actions(mut self, actions: impl IntoIterator<Item = Action>) -> Self {
        self.actions.extend(actions);
        self
    }

    pub fn with_cookie(mut self, cookie: u64) -> Self {
        self.cookie = cookie;
        self
    }

    pub fn with_idle_timeout(mut self, seconds: u16) -> Self {
        self.idle_timeout = seconds;
        self
    }

    pub fn key(&self) -> FlowKey {
        FlowKey {
            node: self.node.clone(),
            table: self.table,
            match_key: self.matches.match_key(),
        }
    }

    /// Deterministic name derived from table, priority and match.
    pub fn name(&self) -> String {
        format!(
            "{}-{}-{}",
            self.logical_table,
            self.priority,
            self.matches.match_key()
        )
    }

    pub fn goto_table(&self) -> Option<u8> {
        self.actions.iter().find_map(|a| match a {
            Action::GotoTable(t) => Some(*t),
            _ => None,
        })
    }

    pub fn has_action(&self, action: &Action) -> bool {
        self.actions.contains(action)
    }
}

impl fmt::Display for FlowEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let actions: Vec<String> = self.actions.iter().map(|a| a.to_string()).collect();
        write!(
            f,
            "{} table={} priority={} cookie={:#x} {} actions={}",
            self.node,
            self.table,
            self.priority,
            self.cookie,
            self.matches.match_key(),
            actions.join(",")
        )
    }
}
