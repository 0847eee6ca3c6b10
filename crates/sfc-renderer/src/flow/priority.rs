//! Priority bands. Higher values win.

/// Match-any rule of every table.
pub const DEFAULT: u16 = 5;

pub const TRANSPORT_INGRESS: u16 = 250;
pub const TRANSPORT_INGRESS_ARP: u16 = 300;

pub const PATH_MAPPER: u16 = 350;
/// Added when the tag match is narrowed to a function-facing port.
pub const PATH_MAPPER_FUNCTION_DELTA: u16 = 10;

pub const PATH_MAPPER_ACL: u16 = 450;

pub const NEXT_HOP: u16 = 550;
/// Subtracted when the previous hop's address is unknown.
pub const NEXT_HOP_UNKNOWN_SOURCE_DELTA: u16 = 10;

pub const TRANSPORT_EGRESS: u16 = 650;
/// Added when the next hop's address is unknown.
pub const EGRESS_UNKNOWN_DESTINATION_DELTA: u16 = 10;
/// Added to the output-to-ingress-port variant of a last hop.
pub const EGRESS_PORT_COLLISION_DELTA: u16 = 5;

pub const fn next_hop(source_known: bool) -> u16 {
    if source_known {
        NEXT_HOP
    } else {
        NEXT_HOP - NEXT_HOP_UNKNOWN_SOURCE_DELTA
    }
}

pub const fn transport_egress(destination_known: bool) -> u16 {
    if destination_known {
        TRANSPORT_EGRESS
    } else {
        TRANSPORT_EGRESS + EGRESS_UNKNOWN_DESTINATION_DELTA
    }
}

pub const fn path_mapper(function_specific: bool) -> u16 {
    if function_specific {
        PATH_MAPPER + PATH_MAPPER_FUNCTION_DELTA
    } else {
        PATH_MAPPER
    }
}
