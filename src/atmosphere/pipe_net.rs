use std::collections::{BTreeMap, BTreeSet, VecDeque};

use bevy::log::{debug, trace};
use bevy::prelude::IVec2;
use slotmap::{new_key_type, SlotMap};

use super::constants::T20C;
use super::error::AtmosError;
use super::gas::{GasMixture, GasRegistry};
use super::holder::GasMixtureHolder;
use super::reactions::{HolderKind, ReactionContext, ReactionResult};

new_key_type! {
    /// A single pipe segment.
    pub struct PipeNodeId;
    /// A connected set of pipe segments sharing one mixture.
    pub struct PipeNetId;
}

#[derive(Debug, Clone)]
pub struct PipeNode {
    pub position: IVec2,
    pub volume: f32,
    links: BTreeSet<PipeNodeId>,
    net: Option<PipeNetId>,
}

impl PipeNode {
    pub fn links(&self) -> impl Iterator<Item = PipeNodeId> + '_ {
        self.links.iter().copied()
    }
}

/// Gas shared by every pipe segment of one connected component.
#[derive(Debug, Clone)]
pub struct PipeNet {
    air: GasMixture,
    nodes: BTreeSet<PipeNodeId>,
    /// Where the gas goes if every segment is removed.
    last_position: IVec2,
}

impl PipeNet {
    pub fn air(&self) -> &GasMixture {
        &self.air
    }

    pub fn nodes(&self) -> impl Iterator<Item = PipeNodeId> + '_ {
        self.nodes.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl GasMixtureHolder for PipeNet {
    fn holder_kind(&self) -> HolderKind {
        HolderKind::PipeNet
    }

    fn air(&self) -> Option<&GasMixture> {
        Some(&self.air)
    }

    fn air_mut(&mut self) -> Option<&mut GasMixture> {
        Some(&mut self.air)
    }
}

/// Pipe graph of one grid.
///
/// Edits only mark segments dirty; [`remake_dirty`](Self::remake_dirty) rebuilds the nets
/// they touch. Until then [`net_of`](Self::net_of) reports the previous topology.
#[derive(Debug, Clone, Default)]
pub struct PipeNetwork {
    nodes: SlotMap<PipeNodeId, PipeNode>,
    nets: SlotMap<PipeNetId, PipeNet>,
    dirty_nodes: BTreeSet<PipeNodeId>,
    dirty_nets: BTreeSet<PipeNetId>,
    vented: Vec<(IVec2, GasMixture)>,
}

impl PipeNetwork {
    pub fn add_pipe(&mut self, position: IVec2, volume: f32) -> PipeNodeId {
        let id = self.nodes.insert(PipeNode {
            position,
            volume: volume.max(0.0),
            links: BTreeSet::new(),
            net: None,
        });
        self.dirty_nodes.insert(id);
        id
    }

    pub fn connect(&mut self, a: PipeNodeId, b: PipeNodeId) -> Result<(), AtmosError> {
        self.check(a)?;
        self.check(b)?;
        if a == b {
            return Ok(());
        }
        self.link(a, b, true);
        Ok(())
    }

    pub fn disconnect(&mut self, a: PipeNodeId, b: PipeNodeId) -> Result<(), AtmosError> {
        self.check(a)?;
        self.check(b)?;
        self.link(a, b, false);
        Ok(())
    }

    /// Remove a segment. Its share of the gas stays with whatever it was connected to.
    pub fn remove_pipe(&mut self, id: PipeNodeId) -> Result<(), AtmosError> {
        let node = self.nodes.remove(id).ok_or(AtmosError::UnknownPipeNode(id))?;
        for other in &node.links {
            if let Some(other_node) = self.nodes.get_mut(*other) {
                other_node.links.remove(&id);
                self.dirty_nodes.insert(*other);
            }
        }
        if let Some(net_id) = node.net {
            if let Some(net) = self.nets.get_mut(net_id) {
                net.nodes.remove(&id);
                net.last_position = node.position;
                self.dirty_nets.insert(net_id);
            }
        }
        self.dirty_nodes.remove(&id);
        Ok(())
    }

    pub fn node(&self, id: PipeNodeId) -> Option<&PipeNode> {
        self.nodes.get(id)
    }

    pub fn net(&self, id: PipeNetId) -> Option<&PipeNet> {
        self.nets.get(id)
    }

    pub fn nets(&self) -> impl Iterator<Item = (PipeNetId, &PipeNet)> {
        self.nets.iter()
    }

    pub fn net_of(&self, node: PipeNodeId) -> Option<PipeNetId> {
        self.nodes.get(node).and_then(|node| node.net)
    }

    pub fn net_air(&self, node: PipeNodeId) -> Option<&GasMixture> {
        self.net_of(node)
            .and_then(|net| self.nets.get(net))
            .map(|net| &net.air)
    }

    /// Mutable gas of the net a segment belongs to, rebuilding pending topology first.
    pub fn net_air_mut(
        &mut self,
        node: PipeNodeId,
        registry: &GasRegistry,
    ) -> Result<&mut GasMixture, AtmosError> {
        self.check(node)?;
        self.remake_dirty(registry);
        self.net_of(node)
            .and_then(|net| self.nets.get_mut(net))
            .map(|net| &mut net.air)
            .ok_or(AtmosError::UnknownPipeNode(node))
    }

    /// Moles attributed to one segment: its volume share of the net.
    pub fn node_moles(&self, node: PipeNodeId) -> Option<f32> {
        let volume = self.nodes.get(node)?.volume;
        let air = self.net_air(node)?;
        if air.volume() <= 0.0 {
            return Some(0.0);
        }
        Some(air.total_moles() * volume / air.volume())
    }

    pub fn merge_into_pipe(
        &mut self,
        node: PipeNodeId,
        gas: &GasMixture,
        registry: &GasRegistry,
    ) -> Result<(), AtmosError> {
        self.net_air_mut(node, registry)?.merge(gas, registry);
        Ok(())
    }

    pub fn net_count(&self) -> usize {
        self.nets.len()
    }

    pub fn total_moles(&self) -> f32 {
        let nets: f32 = self.nets.values().map(|net| net.air.total_moles()).sum();
        let vented: f32 = self.vented.iter().map(|(_, gas)| gas.total_moles()).sum();
        nets + vented
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty_nodes.is_empty() || !self.dirty_nets.is_empty()
    }

    /// Rebuild every net touched by an edit since the last call. Components that already
    /// match a net keep it as is; everything else gets a fresh net whose gas comes from the
    /// old nets in proportion to the volume their surviving segments bring.
    pub fn remake_dirty(&mut self, registry: &GasRegistry) {
        if !self.is_dirty() {
            return;
        }

        let mut seeds: BTreeSet<PipeNodeId> = std::mem::take(&mut self.dirty_nodes);
        let dirty_nets = std::mem::take(&mut self.dirty_nets);
        let touched_nets: BTreeSet<PipeNetId> = seeds
            .iter()
            .filter_map(|&id| self.net_of(id))
            .chain(dirty_nets.iter().copied())
            .collect();
        for net_id in &touched_nets {
            if let Some(net) = self.nets.get(*net_id) {
                seeds.extend(net.nodes.iter().copied());
            }
        }

        let mut visited = BTreeSet::new();
        let mut components = Vec::new();
        for seed in seeds {
            if !self.nodes.contains_key(seed) || !visited.insert(seed) {
                continue;
            }
            components.push(self.component(seed, &mut visited));
        }

        let mut rebuilt = Vec::new();
        for component in components {
            let old: BTreeSet<PipeNetId> = component
                .iter()
                .filter_map(|&id| self.net_of(id))
                .collect();
            let volume: f32 = component.iter().map(|&id| self.nodes[id].volume).sum();

            if old.len() == 1 {
                if let Some(net) = old.first().and_then(|&id| self.nets.get_mut(id)) {
                    if net.nodes.iter().eq(component.iter()) {
                        net.air.set_volume(volume);
                        continue;
                    }
                }
            }
            rebuilt.push((component, volume));
        }

        let mut shares: BTreeMap<PipeNetId, f32> = BTreeMap::new();
        for (component, _) in &rebuilt {
            for &id in component {
                if let Some(net_id) = self.nodes[id].net {
                    *shares.entry(net_id).or_default() += self.nodes[id].volume;
                }
            }
        }

        let mut created = 0;
        for (component, volume) in rebuilt {
            let mut air = GasMixture::new(volume, T20C);
            let mut contributed: BTreeMap<PipeNetId, f32> = BTreeMap::new();
            for &id in &component {
                if let Some(net_id) = self.nodes[id].net {
                    *contributed.entry(net_id).or_default() += self.nodes[id].volume;
                }
            }
            for (net_id, part) in contributed {
                let total = shares.get(&net_id).copied().unwrap_or(0.0);
                let Some(old_net) = self.nets.get_mut(net_id) else {
                    continue;
                };
                let ratio = if part >= total * 0.9999 {
                    1.0
                } else {
                    part / total
                };
                let taken = old_net.air.remove_ratio(ratio);
                air.merge(&taken, registry);
                // Later parts divide what is left.
                if let Some(left) = shares.get_mut(&net_id) {
                    *left -= part;
                }
            }

            let last_position = component
                .first()
                .map_or(IVec2::ZERO, |&id| self.nodes[id].position);
            let net_id = self.nets.insert(PipeNet {
                air,
                nodes: component.iter().copied().collect(),
                last_position,
            });
            for id in component {
                self.nodes[id].net = Some(net_id);
            }
            created += 1;
        }

        let mut retired = 0;
        for net_id in touched_nets {
            let Some(net) = self.nets.get(net_id) else {
                continue;
            };
            let still_owned = net
                .nodes
                .iter()
                .any(|&id| self.nodes.get(id).and_then(|node| node.net) == Some(net_id));
            if still_owned {
                continue;
            }
            if let Some(net) = self.nets.remove(net_id) {
                retired += 1;
                if net.air.total_moles() > 0.0 && net.nodes.iter().all(|id| !self.nodes.contains_key(*id)) {
                    debug!("venting pipe net gas at {}", net.last_position);
                    self.vented.push((net.last_position, net.air));
                }
            }
        }
        trace!("pipe nets remade: {} created, {} retired", created, retired);
    }

    /// Gas of removed nets waiting to be released onto the tiles they ended on.
    pub(crate) fn take_vented(&mut self) -> Vec<(IVec2, GasMixture)> {
        std::mem::take(&mut self.vented)
    }

    pub fn net_ids(&self) -> impl Iterator<Item = PipeNetId> + '_ {
        self.nets.keys()
    }

    /// Let one net's gas react in place. Nets removed since the id was taken are skipped.
    pub fn react_net(&mut self, id: PipeNetId, registry: &GasRegistry) -> ReactionResult {
        let Some(net) = self.nets.get_mut(id) else {
            return ReactionResult::empty();
        };
        let mut context = ReactionContext::new(HolderKind::PipeNet);
        registry.react(&mut net.air, &mut context)
    }

    fn check(&self, id: PipeNodeId) -> Result<(), AtmosError> {
        if self.nodes.contains_key(id) {
            Ok(())
        } else {
            Err(AtmosError::UnknownPipeNode(id))
        }
    }

    fn link(&mut self, a: PipeNodeId, b: PipeNodeId, linked: bool) {
        for (from, to) in [(a, b), (b, a)] {
            if let Some(node) = self.nodes.get_mut(from) {
                let changed = if linked {
                    node.links.insert(to)
                } else {
                    node.links.remove(&to)
                };
                if changed {
                    self.dirty_nodes.insert(from);
                }
            }
        }
    }

    fn component(&self, seed: PipeNodeId, visited: &mut BTreeSet<PipeNodeId>) -> Vec<PipeNodeId> {
        let mut component = vec![seed];
        let mut queue = VecDeque::from([seed]);
        while let Some(id) = queue.pop_front() {
            for &next in &self.nodes[id].links {
                if self.nodes.contains_key(next) && visited.insert(next) {
                    component.push(next);
                    queue.push_back(next);
                }
            }
        }
        component.sort();
        component
    }
}
