// Copyright (C) Parity Technologies (UK) Ltd.
// This file is part of Polkadot.

// Polkadot is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// Polkadot is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with Polkadot.  If not, see <http://www.gnu.org/licenses/>.

//! Trees of prospective parachain candidates.
//!
//! # Overview
//!
//! A [`FragmentTree`] arranges the candidates of a single para which could be backed on top of a
//! single relay-chain block. Every node of the tree is a [`Fragment`]: a candidate checked against
//! the [`Constraints`] it would operate under at that position. The implicit root of the tree
//! stands for the para head recorded in the relay-parent's state, and the constraints of a node's
//! children are the base constraints of the [`Scope`] with every modification on the path from
//! the root applied.
//!
//! Candidates are owned by the [`CandidateStorage`] of the para. A para has one storage but may
//! have many trees, one per active leaf, and trees refer into the storage by candidate hash.
//! Higher-level code prunes the storage once trees are dropped.
//!
//! # Cycles
//!
//! Candidates name their parent only by head-data, and nothing forces a para to produce unique
//! head-data. A candidate can therefore be reachable along several paths, and the same candidate
//! may appear at several depths of one tree. A candidate whose output equals its parent head even
//! forms a chain with itself:
//!
//! ```text
//!            committed head
//!                  |
//! depth 0:      head_a
//!                  |
//! depth 1:      head_b
//!                  |
//! depth 2:      head_a
//!                  |
//! depth 3:      head_b
//! ```
//!
//! Depth is thus an attribute of a node, not of a candidate. The maximum depth of the scope
//! bounds such chains, which keeps the size of a tree bounded as long as the storage is.


mod storage;

pub use storage::{
	CandidateEntry, CandidateState, CandidateStorage, CandidateStorageInsertionError,
	PendingAvailability,
};

use std::{
	collections::{BTreeMap, HashMap},
	sync::Arc,
};

use crate::{messages::HypotheticalCandidate, LOG_TARGET};
use bitvec::prelude::*;
use prospective_primitives::{BlockNumber, CandidateHash, Hash, Hasher, Id as ParaId};
use prospective_subsystem_util::inclusion_emulator::{
	ConstraintModifications, Constraints, Fragment, ProspectiveCandidate, RelayChainBlockInfo,
};

/// The scope of a [`FragmentTree`].
#[derive(Debug, Clone)]
pub struct Scope {
	para: ParaId,
	relay_parent: RelayChainBlockInfo,
	ancestors: BTreeMap<BlockNumber, RelayChainBlockInfo>,
	ancestors_by_hash: HashMap<Hash, RelayChainBlockInfo>,
	pending_availability: Vec<PendingAvailability>,
	base_constraints: Constraints,
	max_depth: usize,
}

/// An error variant indicating that ancestors provided to a scope
/// had unexpected order.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Unexpected ancestor #{number} following #{prev}")]
pub struct UnexpectedAncestor {
	/// The block number that this error occurred at.
	pub number: BlockNumber,
	/// The previous seen block number, which did not match `number`.
	pub prev: BlockNumber,
}

impl Scope {
	/// Define a new [`Scope`].
	///
	/// Ancestors are given newest first, starting with the parent of `relay_parent` and going
	/// back one block number at a time. Any gap or reordering is rejected. Ancestors are only
	/// consumed down to the `min_relay_parent_number` of the base constraints, and none at all
	/// may be given.
	pub fn with_ancestors(
		para: ParaId,
		relay_parent: RelayChainBlockInfo,
		base_constraints: Constraints,
		pending_availability: Vec<PendingAvailability>,
		max_depth: usize,
		ancestors: impl IntoIterator<Item = RelayChainBlockInfo>,
	) -> Result<Self, UnexpectedAncestor> {
		let mut ancestors_map = BTreeMap::new();
		let mut ancestors_by_hash = HashMap::new();

		let mut prev = relay_parent.number;
		for ancestor in ancestors {
			if prev == 0 || ancestor.number != prev - 1 {
				return Err(UnexpectedAncestor { number: ancestor.number, prev })
			}

			if prev == base_constraints.min_relay_parent_number {
				break
			}

			prev = ancestor.number;
			ancestors_by_hash.insert(ancestor.hash, ancestor.clone());
			ancestors_map.insert(ancestor.number, ancestor);
		}

		Ok(Scope {
			para,
			relay_parent,
			ancestors: ancestors_map,
			ancestors_by_hash,
			pending_availability,
			base_constraints,
			max_depth,
		})
	}

	/// The para the scope is defined for.
	pub fn para(&self) -> ParaId {
		self.para
	}

	/// The relay-parent the scope is anchored to.
	pub fn relay_parent(&self) -> &RelayChainBlockInfo {
		&self.relay_parent
	}

	/// The maximum depth of candidates in the tree.
	pub fn max_depth(&self) -> usize {
		self.max_depth
	}

	/// Get the earliest relay-parent allowed in the scope of the fragment tree.
	pub fn earliest_relay_parent(&self) -> RelayChainBlockInfo {
		self.ancestors
			.values()
			.next()
			.cloned()
			.unwrap_or_else(|| self.relay_parent.clone())
	}

	/// Get the ancestor of the fragment tree by hash. The relay-parent itself counts.
	pub fn ancestor_by_hash(&self, hash: &Hash) -> Option<RelayChainBlockInfo> {
		if hash == &self.relay_parent.hash {
			return Some(self.relay_parent.clone())
		}

		self.ancestors_by_hash.get(hash).cloned()
	}

	/// Whether the candidate in question is one pending availability in this scope.
	pub fn get_pending_availability(
		&self,
		candidate_hash: &CandidateHash,
	) -> Option<&PendingAvailability> {
		self.pending_availability.iter().find(|c| &c.candidate_hash == candidate_hash)
	}

	/// Get the base constraints of the scope
	pub fn base_constraints(&self) -> &Constraints {
		&self.base_constraints
	}
}

/// Nodes are addressed by their index in the flat node storage of the tree, apart from the
/// implicit root.
#[derive(Debug, Clone, Copy, PartialEq)]
enum NodePointer {
	Root,
	Storage(usize),
}

impl NodePointer {
	// Account for a node having been inserted at `pos`.
	fn shift_from(&mut self, pos: usize) {
		if let NodePointer::Storage(ref mut ptr) = self {
			if *ptr >= pos {
				*ptr += 1;
			}
		}
	}
}

/// A tree of candidates based on some underlying storage of candidates and a scope.
///
/// All nodes in the tree are either pending availability or have their relay-parent within the
/// scope, i.e. at the scope's relay-parent or one of its ancestors.
pub struct FragmentTree {
	scope: Scope,
	hasher: Arc<dyn Hasher>,

	// Invariant: a contiguous prefix of the 'nodes' storage will contain
	// the top-level children.
	nodes: Vec<FragmentNode>,

	// The candidates stored in this tree, mapped to a bitvec indicating the depths
	// where the candidate is stored.
	candidates: HashMap<CandidateHash, BitVec<u16, Msb0>>,
}

impl FragmentTree {
	/// Create a new [`FragmentTree`] with the given scope and populate it from the storage.
	///
	/// Population is recursive: candidates building on other candidates of the storage are
	/// picked up as well.
	pub fn populate(scope: Scope, storage: &CandidateStorage) -> Self {
		tracing::trace!(
			target: LOG_TARGET,
			relay_parent = ?scope.relay_parent.hash,
			relay_parent_num = scope.relay_parent.number,
			para_id = ?scope.para,
			ancestors = scope.ancestors.len(),
			"Instantiating Fragment Tree",
		);

		let mut tree = FragmentTree {
			scope,
			hasher: storage.hasher().clone(),
			nodes: Vec::new(),
			candidates: HashMap::new(),
		};

		tree.populate_from_bases(storage, vec![NodePointer::Root]);

		tree
	}

	/// Get the scope of the Fragment Tree.
	pub fn scope(&self) -> &Scope {
		&self.scope
	}

	/// Returns an O(n) iterator over the hashes of candidates contained in the
	/// tree.
	pub fn candidates(&self) -> impl Iterator<Item = CandidateHash> + '_ {
		self.candidates.keys().cloned()
	}

	/// Whether the candidate exists and at what depths.
	pub fn candidate(&self, candidate: &CandidateHash) -> Option<Vec<usize>> {
		self.candidates.get(candidate).map(|d| d.iter_ones().collect())
	}

	/// Add a candidate and recursively populate from storage.
	///
	/// The candidate is tried under the root and under every node whose output matches its
	/// parent head. A candidate unknown to the storage is ignored.
	pub fn add_and_populate(&mut self, hash: CandidateHash, storage: &CandidateStorage) {
		let Some(candidate_entry) = storage.get(&hash) else { return };

		let candidate_parent = &candidate_entry.candidate.persisted_validation_data.parent_head;

		let root_base = (&self.scope.base_constraints.required_parent == candidate_parent)
			.then_some(NodePointer::Root);

		let non_root_bases = self
			.nodes
			.iter()
			.enumerate()
			.filter(|(_, n)| {
				n.cumulative_modifications.required_parent.as_ref() == Some(candidate_parent)
			})
			.map(|(i, _)| NodePointer::Storage(i));

		let bases = root_base.into_iter().chain(non_root_bases).collect();

		self.populate_from_bases(storage, bases);
	}

	/// Select a candidate after the given `required_path` which passes
	/// the predicate.
	///
	/// The path is followed from the root along recorded child edges only, and `None` is
	/// returned if any step of it is missing from the tree. Candidates pending availability
	/// are never selected.
	///
	/// If there are multiple possibilities, this will select the first one.
	pub fn select_child(
		&self,
		required_path: &[CandidateHash],
		pred: impl Fn(&CandidateHash) -> bool,
	) -> Option<CandidateHash> {
		let base_node = required_path
			.iter()
			.try_fold(NodePointer::Root, |node, required_step| {
				self.node_candidate_child(node, required_step)
			})?;

		let selectable = |hash: &CandidateHash| {
			self.scope.get_pending_availability(hash).is_none() && pred(hash)
		};

		match base_node {
			NodePointer::Root => self
				.root_children()
				.map(|(_, n)| n.candidate_hash)
				.find(|hash| selectable(hash)),
			NodePointer::Storage(ptr) => self
				.nodes
				.get(ptr)?
				.children
				.iter()
				.map(|(_, hash)| *hash)
				.find(|hash| selectable(hash)),
		}
	}

	/// Returns the hypothetical depths where a candidate with the given hash and parent head data
	/// would be added to the tree, without applying other candidates recursively on top of it.
	///
	/// If the candidate is already known, this returns the actual depths where this
	/// candidate is part of the tree.
	///
	/// Setting `backed_in_path_only` to `true` ensures this function only returns such membership
	/// that every candidate in the path from the root is backed.
	pub fn hypothetical_depths(
		&self,
		hash: CandidateHash,
		candidate: &HypotheticalCandidate,
		candidate_storage: &CandidateStorage,
		backed_in_path_only: bool,
	) -> Vec<usize> {
		// Known candidates need no traversal unless the path matters.
		if !backed_in_path_only {
			if let Some(depths) = self.candidates.get(&hash) {
				return depths.iter_ones().collect()
			}
		}

		let Some(candidate_relay_parent) = self.scope.ancestor_by_hash(&candidate.relay_parent())
		else {
			return Vec::new()
		};

		let max_depth = self.scope.max_depth;
		let parent_head_hash = candidate.parent_head_data_hash(&*self.hasher);
		let mut depths = bitvec![u16, Msb0; 0; max_depth + 1];

		// A complete candidate is checked against the constraints of every candidate position.
		let prospective_candidate = match candidate {
			HypotheticalCandidate::Complete { receipt, persisted_validation_data, .. } =>
				Some(Arc::new(ProspectiveCandidate {
					commitments: receipt.commitments.clone(),
					collator: receipt.descriptor().collator.clone(),
					collator_signature: receipt.descriptor().signature.clone(),
					persisted_validation_data: persisted_validation_data.clone(),
					pov_hash: receipt.descriptor().pov_hash,
					validation_code_hash: receipt.descriptor().validation_code_hash,
				})),
			HypotheticalCandidate::Incomplete { .. } => None,
		};

		let node_pointers = (0..self.nodes.len()).map(NodePointer::Storage);
		for parent_pointer in std::iter::once(NodePointer::Root).chain(node_pointers) {
			let Some((modifications, child_depth, earliest_rp)) = self.edge_base(parent_pointer)
			else {
				continue
			};

			if child_depth > max_depth {
				continue
			}

			if earliest_rp.number > candidate_relay_parent.number {
				continue
			}

			let Some(child_constraints) = self.child_constraints(&modifications) else { continue };

			if parent_head_hash != child_constraints.required_parent.hash(&*self.hasher) {
				continue
			}

			if let Some(ref prospective_candidate) = prospective_candidate {
				if let Err(err) = Fragment::new(
					candidate_relay_parent.clone(),
					child_constraints,
					prospective_candidate.clone(),
				) {
					tracing::trace!(
						target: LOG_TARGET,
						candidate_hash = ?hash,
						?err,
						"Hypothetical candidate is invalid at this position",
					);

					continue
				}
			}

			if !backed_in_path_only ||
				self.path_contains_backed_only_candidates(parent_pointer, candidate_storage)
			{
				depths.set(child_depth, true);
			}
		}

		depths.iter_ones().collect()
	}

	fn root_children(&self) -> impl Iterator<Item = (usize, &FragmentNode)> + '_ {
		self.nodes.iter().enumerate().take_while(|(_, n)| n.parent == NodePointer::Root)
	}

	fn node_candidate_child(
		&self,
		pointer: NodePointer,
		candidate_hash: &CandidateHash,
	) -> Option<NodePointer> {
		match pointer {
			NodePointer::Root => self
				.root_children()
				.find(|(_, n)| &n.candidate_hash == candidate_hash)
				.map(|(i, _)| NodePointer::Storage(i)),
			NodePointer::Storage(ptr) =>
				self.nodes.get(ptr).and_then(|n| n.candidate_child(candidate_hash)),
		}
	}

	/// Returns `true` if the path from the root to the node's parent (inclusive)
	/// only contains backed candidates, `false` otherwise.
	fn path_contains_backed_only_candidates(
		&self,
		mut parent_pointer: NodePointer,
		candidate_storage: &CandidateStorage,
	) -> bool {
		while let NodePointer::Storage(ptr) = parent_pointer {
			let node = &self.nodes[ptr];
			if !candidate_storage.is_backed(&node.candidate_hash) {
				return false
			}
			parent_pointer = node.parent;
		}

		true
	}

	// The cumulative modifications, the depth of children and the earliest relay-parent
	// children may use, for children of the given node.
	fn edge_base(
		&self,
		pointer: NodePointer,
	) -> Option<(ConstraintModifications, usize, RelayChainBlockInfo)> {
		match pointer {
			NodePointer::Root =>
				Some((ConstraintModifications::identity(), 0, self.scope.earliest_relay_parent())),
			NodePointer::Storage(ptr) => {
				let node = self.nodes.get(ptr)?;

				// Nodes with their relay-parent out of scope must be pending availability.
				let parent_rp = self.scope.ancestor_by_hash(&node.relay_parent()).or_else(|| {
					self.scope
						.get_pending_availability(&node.candidate_hash)
						.map(|c| c.relay_parent.clone())
				});

				let Some(parent_rp) = parent_rp else {
					tracing::warn!(
						target: LOG_TARGET,
						candidate_hash = ?node.candidate_hash,
						relay_parent = ?node.relay_parent(),
						"Node relay-parent is neither in scope nor pending availability",
					);
					return None
				};

				Some((node.cumulative_modifications.clone(), node.depth + 1, parent_rp))
			},
		}
	}

	fn child_constraints(&self, modifications: &ConstraintModifications) -> Option<Constraints> {
		match self.scope.base_constraints.apply_modifications(modifications) {
			Ok(c) => Some(c),
			Err(e) => {
				tracing::debug!(
					target: LOG_TARGET,
					new_parent_head = ?modifications.required_parent,
					err = ?e,
					"Failed to apply modifications",
				);

				None
			},
		}
	}

	// Inserts a node and returns its position.
	//
	// Root-parented nodes are kept as a prefix of the storage, so placing one moves every later
	// node up by one. All pointers held by the tree are updated in that case.
	fn insert_node(&mut self, node: FragmentNode) -> usize {
		let candidate_hash = node.candidate_hash;
		let max_depth = self.scope.max_depth;

		self.candidates
			.entry(candidate_hash)
			.or_insert_with(|| bitvec![u16, Msb0; 0; max_depth + 1])
			.set(node.depth, true);

		match node.parent {
			NodePointer::Storage(ptr) => {
				let pos = self.nodes.len();
				self.nodes.push(node);
				self.nodes[ptr].children.push((NodePointer::Storage(pos), candidate_hash));
				pos
			},
			NodePointer::Root => {
				let pos = self.root_children().count();
				self.nodes.insert(pos, node);

				if pos + 1 < self.nodes.len() {
					for n in self.nodes.iter_mut() {
						n.parent.shift_from(pos);
						n.children.iter_mut().for_each(|(child, _)| child.shift_from(pos));
					}
				}

				pos
			},
		}
	}

	fn populate_from_bases(&mut self, storage: &CandidateStorage, initial_bases: Vec<NodePointer>) {
		// Populate the tree breadth-first. Every sweep handles the nodes added by the previous
		// one, until a sweep adds nothing.
		let mut frontier = initial_bases;

		while !frontier.is_empty() {
			let mut added = Vec::new();

			let mut next = 0;
			while next < frontier.len() {
				let parent_pointer = frontier[next];
				next += 1;

				let Some((modifications, child_depth, earliest_rp)) =
					self.edge_base(parent_pointer)
				else {
					continue
				};

				if child_depth > self.scope.max_depth {
					continue
				}

				let Some(child_constraints) = self.child_constraints(&modifications) else {
					continue
				};

				// Add nodes to tree wherever
				// 1. parent hash is correct
				// 2. relay-parent does not move backwards.
				// 3. all non-pending-availability candidates have relay-parent in scope.
				// 4. candidate outputs fulfill constraints
				let required_head_hash = child_constraints.required_parent.hash(&*self.hasher);
				for candidate in storage.iter_para_children(&required_head_hash) {
					let pending = self.scope.get_pending_availability(&candidate.candidate_hash);
					let relay_parent = pending
						.map(|p| p.relay_parent.clone())
						.or_else(|| self.scope.ancestor_by_hash(&candidate.relay_parent));

					let Some(relay_parent) = relay_parent else { continue };

					// Only pending availability candidates may be out of scope. Under the root
					// they are bounded by their own relay-parent, under another node by the
					// relay-parent of that node.
					let min_relay_parent_number = pending
						.map(|p| match parent_pointer {
							NodePointer::Root => p.relay_parent.number,
							NodePointer::Storage(_) => earliest_rp.number,
						})
						.unwrap_or_else(|| {
							std::cmp::max(
								earliest_rp.number,
								self.scope.earliest_relay_parent().number,
							)
						});

					if relay_parent.number < min_relay_parent_number {
						continue // relay parent moved backwards.
					}

					// don't add candidates where the parent already has it as a child.
					let candidate_hash = candidate.candidate_hash;
					if self.node_candidate_child(parent_pointer, &candidate_hash).is_some() {
						continue
					}

					let mut constraints = child_constraints.clone();
					if let Some(p) = pending {
						// overwrite for candidates pending availability as a special-case.
						constraints.min_relay_parent_number = p.relay_parent.number;
					}

					let f = Fragment::new(
						relay_parent.clone(),
						constraints,
						candidate.candidate.clone(),
					);
					let fragment = match f {
						Ok(f) => f,
						Err(e) => {
							tracing::debug!(
								target: LOG_TARGET,
								err = ?e,
								?relay_parent,
								?candidate_hash,
								"Failed to instantiate fragment",
							);

							continue
						},
					};

					let mut cumulative_modifications = modifications.clone();
					cumulative_modifications.stack(fragment.constraint_modifications());

					let pos = self.insert_node(FragmentNode {
						parent: parent_pointer,
						fragment,
						candidate_hash,
						depth: child_depth,
						cumulative_modifications,
						children: Vec::new(),
					});

					if parent_pointer == NodePointer::Root {
						frontier[next..]
							.iter_mut()
							.chain(added.iter_mut())
							.for_each(|p| p.shift_from(pos));
					}

					added.push(NodePointer::Storage(pos));
				}
			}

			frontier = added;
		}
	}
}

struct FragmentNode {
	// A pointer to the parent node.
	parent: NodePointer,
	fragment: Fragment,
	candidate_hash: CandidateHash,
	depth: usize,
	cumulative_modifications: ConstraintModifications,
	children: Vec<(NodePointer, CandidateHash)>,
}

impl FragmentNode {
	fn relay_parent(&self) -> Hash {
		self.fragment.relay_parent().hash
	}

	fn candidate_child(&self, candidate_hash: &CandidateHash) -> Option<NodePointer> {
		self.children.iter().find(|(_, c)| c == candidate_hash).map(|(p, _)| *p)
	}
}
