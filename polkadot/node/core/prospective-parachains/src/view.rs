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

//! The prospective view: fragment trees for every active leaf and the candidate storages
//! backing them.
//!
//! All operations are synchronous. Mutations need `&mut View`, so a single owner serializes
//! them, while queries only read.

use std::{
	collections::{HashMap, HashSet},
	sync::Arc,
};

use crate::{
	fragment_tree::{
		CandidateStorage, CandidateStorageInsertionError, FragmentTree, PendingAvailability, Scope,
	},
	messages::{
		ActivatedLeaf, BackingState, FragmentTreeMembership, HypotheticalCandidate,
		HypotheticalFrontierRequest, ParentHeadData, ProspectiveValidationDataRequest,
	},
	Config, LOG_TARGET,
};
use prospective_primitives::{
	async_backing::CandidatePendingAvailability, BlockNumber, CandidateHash,
	CommittedCandidateReceipt, Hash, HeadData, Hasher, Id as ParaId, PersistedValidationData,
};
use prospective_subsystem_util::inclusion_emulator::RelayChainBlockInfo;

struct RelayBlockViewData {
	// Scheduling info for paras and upcoming paras.
	fragment_trees: HashMap<ParaId, FragmentTree>,
	pending_availability: HashSet<CandidateHash>,
}

/// Fragment trees of all active leaves, together with the per-para candidate storages.
pub struct View {
	config: Config,
	hasher: Arc<dyn Hasher>,
	// Active or recent relay-chain blocks by block hash.
	active_leaves: HashMap<Hash, RelayBlockViewData>,
	candidate_storage: HashMap<ParaId, CandidateStorage>,
}

impl View {
	/// Create an empty view.
	pub fn new(config: Config, hasher: Arc<dyn Hasher>) -> Self {
		View {
			config,
			hasher,
			active_leaves: HashMap::new(),
			candidate_storage: HashMap::new(),
		}
	}

	/// The hasher used for candidate and head-data identities.
	pub fn hasher(&self) -> &dyn Hasher {
		&*self.hasher
	}

	/// The hashes of all active leaves.
	pub fn active_leaves(&self) -> impl Iterator<Item = &Hash> + '_ {
		self.active_leaves.keys()
	}

	/// The fragment tree of a para under an active leaf.
	pub fn fragment_tree(&self, leaf: &Hash, para: &ParaId) -> Option<&FragmentTree> {
		self.active_leaves.get(leaf).and_then(|data| data.fragment_trees.get(para))
	}

	/// The candidate storage of a para.
	pub fn candidate_storage(&self, para: &ParaId) -> Option<&CandidateStorage> {
		self.candidate_storage.get(para)
	}

	/// Activate a leaf, building fragment trees for every para scheduled at it.
	///
	/// Candidates pending availability are added to the storage of their para and marked as
	/// backed, since anything on chain is.
	pub fn activate_leaf(&mut self, leaf: ActivatedLeaf) {
		let ActivatedLeaf { block_info, mut ancestry, paras } = leaf;
		let hash = block_info.hash;
		ancestry.truncate(self.config.allowed_ancestry_len);

		let mut fragment_trees = HashMap::new();
		let mut pending_availability = HashSet::new();

		for (para, BackingState { constraints, pending_availability: pending }) in paras {
			let required_parent = constraints.required_parent.clone();
			let compact_pending = pending.iter().map(compact_pending_availability).collect();

			let scope = match Scope::with_ancestors(
				para,
				block_info.clone(),
				constraints,
				compact_pending,
				self.config.max_candidate_depth,
				ancestry.iter().cloned(),
			) {
				Ok(scope) => scope,
				Err(unexpected_ancestors) => {
					tracing::warn!(
						target: LOG_TARGET,
						para_id = ?para,
						max_candidate_depth = self.config.max_candidate_depth,
						?ancestry,
						leaf = ?hash,
						"Relay chain ancestors have wrong order: {:?}",
						unexpected_ancestors
					);
					continue
				},
			};

			let hasher = &self.hasher;
			let storage = self
				.candidate_storage
				.entry(para)
				.or_insert_with(|| CandidateStorage::new(hasher.clone()));

			pending_availability.extend(pending.iter().map(|c| c.candidate_hash));
			import_pending_availability(storage, para, required_parent, pending);

			tracing::trace!(
				target: LOG_TARGET,
				relay_parent = ?hash,
				min_relay_parent = scope.earliest_relay_parent().number,
				para_id = ?para,
				"Creating fragment tree",
			);

			let tree = FragmentTree::populate(scope, &*storage);
			fragment_trees.insert(para, tree);
		}

		self.active_leaves
			.insert(hash, RelayBlockViewData { fragment_trees, pending_availability });
	}

	/// Deactivate a leaf, dropping its fragment trees. Returns whether the leaf was active.
	///
	/// Candidate storage is left as is until [`View::prune_candidate_storage`] is called.
	pub fn deactivate_leaf(&mut self, hash: &Hash) -> bool {
		self.active_leaves.remove(hash).is_some()
	}

	/// Remove all candidates which are neither part of a fragment tree nor pending
	/// availability under some active leaf, and the storages of paras no active leaf schedules.
	pub fn prune_candidate_storage(&mut self) {
		let mut live_candidates = HashSet::new();
		let mut live_paras = HashSet::new();
		for sub_view in self.active_leaves.values() {
			for (para_id, fragment_tree) in &sub_view.fragment_trees {
				live_candidates.extend(fragment_tree.candidates());
				live_paras.insert(*para_id);
			}

			live_candidates.extend(sub_view.pending_availability.iter().cloned());
		}

		self.candidate_storage.retain(|para_id, storage| {
			if !live_paras.contains(para_id) {
				return false
			}

			storage.retain(|h| live_candidates.contains(h));

			// Even if `storage` is now empty, we retain.
			// This maintains a convenient invariant that para-id storage exists
			// as long as there's an active head which schedules the para.
			true
		});
	}

	/// Introduce a new candidate, returning the fragment trees it became a member of.
	///
	/// A known candidate yields its current membership. A candidate which doesn't fit in any
	/// tree isn't kept.
	pub fn introduce_candidate(
		&mut self,
		para: ParaId,
		candidate: CommittedCandidateReceipt,
		persisted_validation_data: PersistedValidationData,
		candidate_hash: CandidateHash,
	) -> FragmentTreeMembership {
		let Some(storage) = self.candidate_storage.get_mut(&para) else {
			tracing::warn!(
				target: LOG_TARGET,
				para_id = ?para,
				?candidate_hash,
				"Received seconded candidate for inactive para",
			);

			return Vec::new()
		};

		match storage.add_candidate(candidate_hash, candidate, persisted_validation_data) {
			Ok(()) => {},
			Err(CandidateStorageInsertionError::CandidateAlreadyKnown(_)) =>
				return fragment_tree_membership(&self.active_leaves, para, candidate_hash),
			Err(CandidateStorageInsertionError::PersistedValidationDataMismatch) => {
				tracing::warn!(
					target: LOG_TARGET,
					para = ?para,
					?candidate_hash,
					"Received seconded candidate had mismatching validation data",
				);

				return Vec::new()
			},
		}

		let mut membership = Vec::new();
		for (relay_parent, leaf_data) in self.active_leaves.iter_mut() {
			if let Some(tree) = leaf_data.fragment_trees.get_mut(&para) {
				tree.add_and_populate(candidate_hash, &*storage);
				if let Some(depths) = tree.candidate(&candidate_hash) {
					membership.push((*relay_parent, depths));
				}
			}
		}

		if membership.is_empty() {
			tracing::debug!(
				target: LOG_TARGET,
				para = ?para,
				?candidate_hash,
				"Introduced candidate is not a member of any fragment tree",
			);

			storage.remove_candidate(&candidate_hash);
		}

		membership
	}

	/// Note that a known candidate has been seconded.
	pub fn candidate_seconded(&mut self, para: ParaId, candidate_hash: CandidateHash) {
		let Some(storage) = self.candidate_storage.get_mut(&para) else {
			tracing::warn!(
				target: LOG_TARGET,
				para_id = ?para,
				?candidate_hash,
				"Received instruction to second unknown candidate",
			);

			return
		};

		if !storage.contains(&candidate_hash) {
			tracing::warn!(
				target: LOG_TARGET,
				para_id = ?para,
				?candidate_hash,
				"Received instruction to second unknown candidate",
			);

			return
		}

		storage.mark_seconded(&candidate_hash);
	}

	/// Note that a known candidate has been backed.
	pub fn candidate_backed(&mut self, para: ParaId, candidate_hash: CandidateHash) {
		let Some(storage) = self.candidate_storage.get_mut(&para) else {
			tracing::warn!(
				target: LOG_TARGET,
				para_id = ?para,
				?candidate_hash,
				"Received instruction to back unknown candidate",
			);

			return
		};

		if !storage.contains(&candidate_hash) {
			tracing::warn!(
				target: LOG_TARGET,
				para_id = ?para,
				?candidate_hash,
				"Received instruction to back unknown candidate",
			);

			return
		}

		if storage.is_backed(&candidate_hash) {
			tracing::debug!(
				target: LOG_TARGET,
				para_id = ?para,
				?candidate_hash,
				"Received redundant instruction to mark candidate as backed",
			);

			return
		}

		storage.mark_backed(&candidate_hash);
	}

	/// Get a backed candidate which follows `required_path` in the fragment tree of `para`
	/// under the active leaf `relay_parent`, along with the candidate's own relay-parent.
	pub fn get_backable_candidate(
		&self,
		relay_parent: Hash,
		para: ParaId,
		required_path: &[CandidateHash],
	) -> Option<(CandidateHash, Hash)> {
		let Some(data) = self.active_leaves.get(&relay_parent) else {
			tracing::debug!(
				target: LOG_TARGET,
				?relay_parent,
				para_id = ?para,
				"Requested backable candidate for inactive relay-parent."
			);

			return None
		};

		let Some(tree) = data.fragment_trees.get(&para) else {
			tracing::debug!(
				target: LOG_TARGET,
				?relay_parent,
				para_id = ?para,
				"Requested backable candidate for inactive para."
			);

			return None
		};

		let Some(storage) = self.candidate_storage.get(&para) else {
			tracing::warn!(
				target: LOG_TARGET,
				?relay_parent,
				para_id = ?para,
				"No candidate storage for active para",
			);

			return None
		};

		let backable = tree
			.select_child(required_path, |candidate| storage.is_backed(candidate))
			.and_then(|candidate_hash| {
				storage
					.relay_parent_by_candidate_hash(&candidate_hash)
					.map(|candidate_relay_parent| (candidate_hash, candidate_relay_parent))
			});

		if backable.is_none() {
			tracing::trace!(
				target: LOG_TARGET,
				?required_path,
				para_id = ?para,
				%relay_parent,
				"Could not find any backable candidate",
			);
		}

		backable
	}

	/// The membership of a candidate in the fragment trees of all active leaves.
	pub fn get_tree_membership(
		&self,
		para: ParaId,
		candidate_hash: CandidateHash,
	) -> FragmentTreeMembership {
		fragment_tree_membership(&self.active_leaves, para, candidate_hash)
	}

	/// The earliest relay-parent number accepted for each para under an active leaf. Empty if
	/// the leaf isn't active.
	pub fn get_minimum_relay_parents(&self, relay_parent: Hash) -> Vec<(ParaId, BlockNumber)> {
		self.active_leaves
			.get(&relay_parent)
			.map(|leaf_data| {
				leaf_data
					.fragment_trees
					.iter()
					.map(|(para_id, tree)| (*para_id, tree.scope().earliest_relay_parent().number))
					.collect()
			})
			.unwrap_or_default()
	}

	/// Reconstruct the persisted validation data a candidate would be built against, using any
	/// fragment tree of the para.
	pub fn answer_prospective_validation_data_request(
		&self,
		request: &ProspectiveValidationDataRequest,
	) -> Option<PersistedValidationData> {
		let (mut head_data, parent_head_data_hash) = match request.parent_head_data {
			ParentHeadData::OnlyHash(parent_head_data_hash) => (None, parent_head_data_hash),
			ParentHeadData::WithData { ref head_data, hash } => (Some(head_data.clone()), hash),
		};

		if head_data.is_none() {
			head_data = self
				.candidate_storage
				.get(&request.para_id)
				.and_then(|storage| storage.head_data_by_hash(&parent_head_data_hash))
				.cloned();
		}

		let mut relay_parent_info = None;
		let mut max_pov_size = None;

		for fragment_tree in self
			.active_leaves
			.values()
			.filter_map(|x| x.fragment_trees.get(&request.para_id))
		{
			if head_data.is_some() && relay_parent_info.is_some() && max_pov_size.is_some() {
				break
			}

			if relay_parent_info.is_none() {
				relay_parent_info =
					fragment_tree.scope().ancestor_by_hash(&request.candidate_relay_parent);
			}

			if head_data.is_none() {
				let required_parent = &fragment_tree.scope().base_constraints().required_parent;
				if required_parent.hash(&*self.hasher) == parent_head_data_hash {
					head_data = Some(required_parent.clone());
				}
			}

			if max_pov_size.is_none() {
				let contains_ancestor = fragment_tree
					.scope()
					.ancestor_by_hash(&request.candidate_relay_parent)
					.is_some();
				if contains_ancestor {
					// Relay-parents within one tree share the session of its base block, and the
					// max PoV size only changes with the session.
					max_pov_size = Some(fragment_tree.scope().base_constraints().max_pov_size);
				}
			}
		}

		match (head_data, relay_parent_info, max_pov_size) {
			(Some(h), Some(i), Some(m)) => Some(PersistedValidationData {
				parent_head: h,
				relay_parent_number: i.number,
				relay_parent_storage_root: i.storage_root,
				max_pov_size: m,
			}),
			_ => None,
		}
	}

	/// The depths at which each of the given candidates could be placed in the fragment trees
	/// of the active leaves. Nothing is added to any tree.
	pub fn answer_hypothetical_frontier_request(
		&self,
		request: HypotheticalFrontierRequest,
	) -> Vec<(HypotheticalCandidate, FragmentTreeMembership)> {
		let mut response = Vec::with_capacity(request.candidates.len());
		for candidate in request.candidates {
			response.push((candidate, Vec::new()));
		}

		let required_active_leaf = request.fragment_tree_relay_parent;
		for (active_leaf, leaf_view) in self
			.active_leaves
			.iter()
			.filter(|(h, _)| required_active_leaf.as_ref().map_or(true, |x| h == &x))
		{
			for &mut (ref c, ref mut membership) in &mut response {
				let para = c.candidate_para();
				let Some(fragment_tree) = leaf_view.fragment_trees.get(&para) else { continue };
				let Some(candidate_storage) = self.candidate_storage.get(&para) else { continue };

				let depths = fragment_tree.hypothetical_depths(
					c.candidate_hash(),
					c,
					candidate_storage,
					request.backed_in_path_only,
				);

				if !depths.is_empty() {
					membership.push((*active_leaf, depths));
				}
			}
		}

		response
	}

	/// The number of candidates in the trees of active leaves, and the number of candidates
	/// held in storage.
	pub fn candidate_counts(&self) -> (usize, usize) {
		let in_trees = self
			.active_leaves
			.values()
			.flat_map(|data| data.fragment_trees.values())
			.map(|tree| tree.candidates().count())
			.sum();
		let in_storage = self.candidate_storage.values().map(CandidateStorage::len).sum();

		(in_trees, in_storage)
	}
}

fn fragment_tree_membership(
	active_leaves: &HashMap<Hash, RelayBlockViewData>,
	para: ParaId,
	candidate: CandidateHash,
) -> FragmentTreeMembership {
	let mut membership = Vec::new();
	for (relay_parent, view_data) in active_leaves {
		if let Some(tree) = view_data.fragment_trees.get(&para) {
			if let Some(depths) = tree.candidate(&candidate) {
				membership.push((*relay_parent, depths));
			}
		}
	}
	membership
}

// Add the candidates pending availability of a para to its storage, oldest first. Each one
// builds on the output of the previous one.
fn compact_pending_availability(pending: &CandidatePendingAvailability) -> PendingAvailability {
	PendingAvailability {
		candidate_hash: pending.candidate_hash,
		relay_parent: RelayChainBlockInfo {
			hash: pending.descriptor.relay_parent,
			number: pending.relay_parent_number,
			storage_root: pending.relay_parent_storage_root,
		},
	}
}

fn import_pending_availability(
	storage: &mut CandidateStorage,
	para: ParaId,
	required_parent: HeadData,
	pending_availability: Vec<CandidatePendingAvailability>,
) {
	let mut required_parent = required_parent;

	for pending in pending_availability {
		let candidate_hash = pending.candidate_hash;
		let next_required_parent = pending.commitments.head_data.clone();
		let persisted_validation_data = pending.persisted_validation_data(required_parent);

		match storage.add_candidate(
			candidate_hash,
			pending.to_committed_receipt(),
			persisted_validation_data,
		) {
			Ok(()) | Err(CandidateStorageInsertionError::CandidateAlreadyKnown(_)) => {
				// Anything on-chain is guaranteed to be backed.
				storage.mark_backed(&candidate_hash);
			},
			Err(err) => {
				tracing::warn!(
					target: LOG_TARGET,
					?candidate_hash,
					para_id = ?para,
					?err,
					"Scraped invalid candidate pending availability",
				);
			},
		}

		required_parent = next_required_parent;
	}
}
