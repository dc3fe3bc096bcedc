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

//! Implementation of the Prospective Parachains subsystem - this tracks and handles
//! prospective parachain fragments and informs other backing-stage subsystems
//! of work to be done.
//!
//! This is the main coordinator of work within the node for the collation and
//! backing phases of parachain consensus.
//!
//! This is primarily an implementation of "Fragment Trees", as described in
//! [`prospective_subsystem_util::inclusion_emulator`].
//!
//! The [`View`] can be embedded directly by a host which serializes mutations itself. The
//! [`ProspectiveParachainsSubsystem`] wraps it in a message loop which does that.

#![deny(unused_crate_dependencies)]

use std::sync::Arc;

use futures::{channel::oneshot, prelude::*};

use prospective_primitives::Hasher;

use crate::{
	error::{Error, FatalError, FatalResult, Result},
	messages::{
		ActiveLeavesUpdate, FromOrchestra, IntroduceCandidateRequest, OverseerSignal,
		ProspectiveParachainsMessage,
	},
};

mod error;
pub mod fragment_tree;
pub mod messages;
mod metrics;
mod view;


pub use self::{
	error::{Error as SubsystemError, FatalError as SubsystemFatalError},
	metrics::Metrics,
	view::View,
};

pub(crate) const LOG_TARGET: &str = "parachain::prospective-parachains";

/// Configuration of the prospective view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
	/// The maximum depth of candidates in a fragment tree. Candidates at depth 0 build
	/// directly on the para head recorded on chain.
	pub max_candidate_depth: usize,
	/// How many ancestors of a leaf may serve as relay-parents of candidates.
	pub allowed_ancestry_len: usize,
}

impl Default for Config {
	fn default() -> Self {
		Config { max_candidate_depth: 4, allowed_ancestry_len: 3 }
	}
}

/// The prospective parachains subsystem.
pub struct ProspectiveParachainsSubsystem {
	config: Config,
	metrics: Metrics,
	hasher: Arc<dyn Hasher>,
}

impl ProspectiveParachainsSubsystem {
	/// Create a new instance of the `ProspectiveParachainsSubsystem`.
	pub fn new(config: Config, metrics: Metrics, hasher: Arc<dyn Hasher>) -> Self {
		Self { config, metrics, hasher }
	}

	/// Process signals and messages until `Conclude` is received.
	///
	/// A closed channel is fatal. Failing to deliver a response only gets logged.
	pub async fn run(
		self,
		mut receiver: impl Stream<Item = FromOrchestra<ProspectiveParachainsMessage>> + Unpin,
	) -> FatalResult<()> {
		let ProspectiveParachainsSubsystem { config, metrics, hasher } = self;
		let mut view = View::new(config, hasher);

		loop {
			match receiver.next().await.ok_or(FatalError::SubsystemReceive)? {
				FromOrchestra::Signal(OverseerSignal::Conclude) => return Ok(()),
				FromOrchestra::Signal(OverseerSignal::ActiveLeaves(update)) =>
					handle_active_leaves_update(&mut view, update, &metrics),
				FromOrchestra::Communication { msg } =>
					crate::error::log_error(handle_message(&mut view, msg, &metrics))?,
			}
		}
	}
}

fn handle_active_leaves_update(view: &mut View, update: ActiveLeavesUpdate, metrics: &Metrics) {
	// 1. clean up inactive leaves
	// 2. determine all scheduled para at new block
	// 3. construct new fragment tree for each para for each new leaf
	// 4. prune candidate storage.

	let _timer = metrics.time_handle_active_leaves_update();

	tracing::trace!(
		target: LOG_TARGET,
		activated = ?update.activated.as_ref().map(|leaf| leaf.block_info.hash),
		deactivated = ?update.deactivated,
		"Handle ActiveLeavesUpdate"
	);

	for deactivated in &update.deactivated {
		view.deactivate_leaf(deactivated);
	}

	// There can only be one newly activated leaf, `update.activated` is an `Option`.
	for activated in update.activated.into_iter() {
		if update.deactivated.contains(&activated.block_info.hash) {
			continue
		}

		view.activate_leaf(activated);
	}

	if !update.deactivated.is_empty() {
		// This has potential to be a hotspot.
		let _timer = metrics.time_prune_view_candidate_storage();
		view.prune_candidate_storage();
	}

	if metrics.0.is_some() {
		let (in_trees, in_storage) = view.candidate_counts();
		metrics.record_candidate_count(in_trees as u64, in_storage as u64);
		metrics.record_leaves_count(view.active_leaves().count() as u64);
	}
}

fn handle_message(
	view: &mut View,
	msg: ProspectiveParachainsMessage,
	metrics: &Metrics,
) -> Result<()> {
	match msg {
		ProspectiveParachainsMessage::IntroduceCandidate(request, tx) => {
			let membership = {
				let _timer = metrics.time_introduce_candidate();

				let IntroduceCandidateRequest {
					candidate_para: para,
					candidate_receipt: candidate,
					persisted_validation_data: pvd,
				} = request;

				let candidate_hash = candidate.hash(view.hasher());
				view.introduce_candidate(para, candidate, pvd, candidate_hash)
			};

			respond(tx, membership, "IntroduceCandidate")
		},
		ProspectiveParachainsMessage::CandidateSeconded(para, candidate_hash) => {
			view.candidate_seconded(para, candidate_hash);
			Ok(())
		},
		ProspectiveParachainsMessage::CandidateBacked(para, candidate_hash) => {
			let _timer = metrics.time_candidate_backed();
			view.candidate_backed(para, candidate_hash);
			Ok(())
		},
		ProspectiveParachainsMessage::GetBackableCandidate(
			relay_parent,
			para,
			required_path,
			tx,
		) => respond(
			tx,
			view.get_backable_candidate(relay_parent, para, &required_path),
			"GetBackableCandidate",
		),
		ProspectiveParachainsMessage::GetHypotheticalFrontier(request, tx) => {
			let response = {
				let _timer = metrics.time_hypothetical_frontier_request();
				view.answer_hypothetical_frontier_request(request)
			};

			respond(tx, response, "GetHypotheticalFrontier")
		},
		ProspectiveParachainsMessage::GetTreeMembership(para, candidate, tx) =>
			respond(tx, view.get_tree_membership(para, candidate), "GetTreeMembership"),
		ProspectiveParachainsMessage::GetMinimumRelayParents(relay_parent, tx) =>
			respond(tx, view.get_minimum_relay_parents(relay_parent), "GetMinimumRelayParents"),
		ProspectiveParachainsMessage::GetProspectiveValidationData(request, tx) => respond(
			tx,
			view.answer_prospective_validation_data_request(&request),
			"GetProspectiveValidationData",
		),
	}
}

fn respond<T>(tx: oneshot::Sender<T>, response: T, request: &'static str) -> Result<()> {
	tx.send(response).map_err(|_| Error::ResponseChannelDropped(request))
}
