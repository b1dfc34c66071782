//! Binary routing trie for longest-prefix-match next-hop lookup.
//!
//! Distinct from a generic prefix-tree: `find` doesn't require an exact
//! node at the end of the walk, it remembers the deepest populated node
//! seen along the path and returns that. A `0.0.0.0/0` route therefore
//! lives at the root and acts as the default.

use super::types::Ipv4Addr;

#[derive(Default)]
pub struct RoutingTrie {
    content: Option<Ipv4Addr>,
    zero_child: Option<Box<RoutingTrie>>,
    one_child: Option<Box<RoutingTrie>>,
}

impl RoutingTrie {
    pub fn new() -> Self {
        RoutingTrie::default()
    }

    /// Places `next_hop` at the node reached by following `bits`.
    pub fn insert(&mut self, bits: &[bool], next_hop: Ipv4Addr) {
        match bits.split_first() {
            None => self.content = Some(next_hop),
            Some((&false, rest)) => {
                self.zero_child.get_or_insert_with(Box::default).insert(rest, next_hop)
            }
            Some((&true, rest)) => {
                self.one_child.get_or_insert_with(Box::default).insert(rest, next_hop)
            }
        }
    }

    /// Walks root-to-leaf along `bits`, returning the deepest populated
    /// node's value found on the path. `None` if no node on the path
    /// (including the root) carries a value.
    pub fn find(&self, bits: &[bool]) -> Option<Ipv4Addr> {
        let child_result = match bits.split_first() {
            Some((&false, rest)) => self.zero_child.as_ref().and_then(|c| c.find(rest)),
            Some((&true, rest)) => self.one_child.as_ref().and_then(|c| c.find(rest)),
            None => None,
        };
        child_result.or(self.content)
    }

    pub fn insert_cidr(&mut self, route: super::types::CidrRoute) {
        let bits = route.network.to_bitstring();
        self.insert(&bits[..route.prefix_len as usize], route.next_hop);
    }

    pub fn find_addr(&self, addr: Ipv4Addr) -> Option<Ipv4Addr> {
        self.find(&addr.to_bitstring())
    }
}
