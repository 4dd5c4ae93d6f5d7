//! Reservation engine: how much of an offer a node can take.
//!
//! Pure: neither the node nor the offer is modified. Ports are handed out
//! lowest-first by splitting the offer's ranges, so one call never hands
//! out the same port twice.

use fsgrid_core::offer::{ANY_ROLE, CPUS, MEM, PORTS};
use fsgrid_core::{Offer, Range};
use fsgrid_state::{Node, Reservation};

/// Carve the node's wants out of `offer`.
///
/// Only unreserved (`*`) resources are considered, since tasks are
/// launched in that role. Scalars are `min(offered, wanted)` (0 when not
/// offered). Each logical port of the node's type gets the lowest free
/// port; names that find no free port are left out.
pub fn reserve(node: &Node, offer: &Offer) -> Reservation {
    let cpus = offer.scalar_in(CPUS, ANY_ROLE).map_or(0.0, |c| c.min(node.cpus));
    let mem = offer
        .scalar_in(MEM, ANY_ROLE)
        .map_or(0, |m| (m.max(0.0) as u64).min(node.mem));

    let mut avail = offer.ranges_in(PORTS, ANY_ROLE);
    avail.sort_by_key(Range::start);

    let mut reservation = Reservation {
        cpus,
        mem,
        ..Reservation::default()
    };
    for name in node.node_type.port_names() {
        if let Some(port) = reserve_port(None, &mut avail) {
            reservation.ports.insert(name.to_string(), port);
        }
    }
    reservation
}

/// Take one port out of `avail`.
///
/// Without `range`, the start of the first available range is taken;
/// with it, the lowest port of the first available range overlapping it.
/// The range the port came from is replaced in place by what remains.
pub fn reserve_port(range: Option<&Range>, avail: &mut Vec<Range>) -> Option<u32> {
    let (idx, port) = match range {
        None => (0, avail.first()?.start()),
        Some(wanted) => avail
            .iter()
            .enumerate()
            .find_map(|(idx, r)| r.overlap(wanted).map(|o| (idx, o.start())))?,
    };

    let taken = avail.remove(idx);
    let rest = taken.split(port).ok()?;
    avail.splice(idx..idx, rest);
    Some(port)
}
