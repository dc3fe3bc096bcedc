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

use prometheus::{
	core::{AtomicU64, Collector, GenericGauge, GenericGaugeVec},
	Error as PrometheusError, Histogram, HistogramOpts, HistogramTimer, Opts, Registry,
};

#[derive(Clone)]
pub(crate) struct MetricsInner {
	prune_view_candidate_storage: Histogram,
	time_active_leaves_update: Histogram,
	time_introduce_candidate: Histogram,
	time_candidate_backed: Histogram,
	time_hypothetical_frontier_request: Histogram,
	candidate_count: GenericGaugeVec<AtomicU64>,
	active_leaves_count: GenericGauge<AtomicU64>,
}

/// Prospective parachain metrics.
#[derive(Default, Clone)]
pub struct Metrics(pub(crate) Option<MetricsInner>);

impl Metrics {
	/// Provide a timer for `prune_view_candidate_storage` which observes on drop.
	pub fn time_prune_view_candidate_storage(&self) -> Option<HistogramTimer> {
		self.0.as_ref().map(|metrics| metrics.prune_view_candidate_storage.start_timer())
	}

	/// Provide a timer for handling `ActiveLeavesUpdate` which observes on drop.
	pub fn time_handle_active_leaves_update(&self) -> Option<HistogramTimer> {
		self.0.as_ref().map(|metrics| metrics.time_active_leaves_update.start_timer())
	}

	/// Provide a timer for handling `IntroduceCandidate` which observes on drop.
	pub fn time_introduce_candidate(&self) -> Option<HistogramTimer> {
		self.0.as_ref().map(|metrics| metrics.time_introduce_candidate.start_timer())
	}

	/// Provide a timer for handling `CandidateBacked` which observes on drop.
	pub fn time_candidate_backed(&self) -> Option<HistogramTimer> {
		self.0.as_ref().map(|metrics| metrics.time_candidate_backed.start_timer())
	}

	/// Provide a timer for handling `GetHypotheticalFrontier` which observes on drop.
	pub fn time_hypothetical_frontier_request(&self) -> Option<HistogramTimer> {
		self.0
			.as_ref()
			.map(|metrics| metrics.time_hypothetical_frontier_request.start_timer())
	}

	/// Record the number of candidates placed in the fragment trees of active leaves and the
	/// number held in candidate storage.
	pub fn record_candidate_count(&self, in_trees: u64, in_storage: u64) {
		if let Some(metrics) = &self.0 {
			metrics.candidate_count.with_label_values(&["tree"]).set(in_trees);
			metrics.candidate_count.with_label_values(&["storage"]).set(in_storage);
		}
	}

	/// Record the number of active leaves.
	pub fn record_leaves_count(&self, active: u64) {
		if let Some(metrics) = &self.0 {
			metrics.active_leaves_count.set(active);
		}
	}

	/// Register the metrics with the given registry.
	pub fn register(registry: &Registry) -> Result<Self, PrometheusError> {
		let metrics = MetricsInner {
			prune_view_candidate_storage: register(
				histogram(
					"polkadot_parachain_prospective_parachains_prune_view_candidate_storage",
					"Time spent within `prospective_parachains::prune_view_candidate_storage`",
				)?,
				registry,
			)?,
			time_active_leaves_update: register(
				histogram(
					"polkadot_parachain_prospective_parachains_time_active_leaves_update",
					"Time spent within `prospective_parachains::handle_active_leaves_update`",
				)?,
				registry,
			)?,
			time_introduce_candidate: register(
				histogram(
					"polkadot_parachain_prospective_parachains_time_introduce_candidate",
					"Time spent within `prospective_parachains::handle_introduce_candidate`",
				)?,
				registry,
			)?,
			time_candidate_backed: register(
				histogram(
					"polkadot_parachain_prospective_parachains_time_candidate_backed",
					"Time spent within `prospective_parachains::handle_candidate_backed`",
				)?,
				registry,
			)?,
			time_hypothetical_frontier_request: register(
				histogram(
					"polkadot_parachain_prospective_parachains_time_hypothetical_frontier_request",
					"Time spent responding to `GetHypotheticalFrontier`",
				)?,
				registry,
			)?,
			candidate_count: register(
				GenericGaugeVec::new(
					Opts::new(
						"polkadot_parachain_prospective_parachains_candidate_count",
						"Number of candidates in fragment trees of active leaves and in storage",
					),
					&["type"],
				)?,
				registry,
			)?,
			active_leaves_count: register(
				GenericGauge::new(
					"polkadot_parachain_prospective_parachains_active_leaves_count",
					"Number of active leaves",
				)?,
				registry,
			)?,
		};

		Ok(Metrics(Some(metrics)))
	}
}

fn histogram(name: &str, help: &str) -> Result<Histogram, PrometheusError> {
	Histogram::with_opts(HistogramOpts::new(name, help))
}

fn register<T: Collector + Clone + 'static>(
	metric: T,
	registry: &Registry,
) -> Result<T, PrometheusError> {
	registry.register(Box::new(metric.clone()))?;
	Ok(metric)
}
