//! Deterministic sparse connection matrix within a quorum.
//!
//! Every member opens outgoing connections to the positions at power-of-two
//! offsets ahead of it; the mirrored offsets behind it are its incoming
//! sources. The resulting undirected graph has O(log n) degree and connects
//! every ordered pair of members within two hops, which is what the fan-out
//! relay relies on.

/// Positions that `my_position` should actively connect to (strong edges):
/// `(my_position + 2^k) % quorum_size` for every `2^k < quorum_size`.
pub fn quorum_outgoing_conns(my_position: usize, quorum_size: usize) -> Vec<usize> {
    offsets(quorum_size)
        .map(|offset| (my_position + offset) % quorum_size)
        .collect()
}

/// Positions that connect *to* `my_position` under the same rule; contacted
/// only over already-open connections.
pub fn quorum_incoming_conns(my_position: usize, quorum_size: usize) -> Vec<usize> {
    offsets(quorum_size)
        .map(|offset| (my_position + quorum_size - offset % quorum_size) % quorum_size)
        .collect()
}

fn offsets(quorum_size: usize) -> impl Iterator<Item = usize> {
    std::iter::successors(Some(1usize), |o| o.checked_mul(2))
        .take_while(move |&o| o < quorum_size)
}
