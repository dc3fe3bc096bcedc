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

use super::*;
use assert_matches::assert_matches;
use prospective_primitives::{OutboundHrmpMessage, ValidationCode};
use rstest::rstest;

fn make_constraints() -> Constraints {
	let para_a = ParaId::from(1u32);
	let para_b = ParaId::from(2u32);

	Constraints {
		min_relay_parent_number: 5,
		max_pov_size: 1000,
		max_code_size: 1000,
		ump_remaining: 10,
		ump_remaining_bytes: 1024,
		max_ump_num_per_candidate: 5,
		dmp_remaining_messages: Vec::new(),
		hrmp_inbound: InboundHrmpLimitations { valid_watermarks: vec![6, 8] },
		hrmp_channels_out: [
			(
				para_a,
				OutboundHrmpChannelLimitations { bytes_remaining: 512, messages_remaining: 10 },
			),
			(
				para_b,
				OutboundHrmpChannelLimitations { bytes_remaining: 512, messages_remaining: 10 },
			),
		]
		.into_iter()
		.collect(),
		max_hrmp_num_per_candidate: 5,
		required_parent: HeadData::from(vec![1, 2, 3]),
		validation_code_hash: Hash::repeat_byte(42).into(),
		upgrade_restriction: None,
		future_validation_code: None,
	}
}

fn make_relay_parent() -> RelayChainBlockInfo {
	RelayChainBlockInfo {
		number: 6,
		hash: Hash::repeat_byte(0x0a),
		storage_root: Hash::repeat_byte(0xff),
	}
}

fn make_candidate(
	constraints: &Constraints,
	relay_parent: &RelayChainBlockInfo,
) -> ProspectiveCandidate {
	ProspectiveCandidate {
		commitments: CandidateCommitments {
			upward_messages: Vec::new(),
			horizontal_messages: Vec::new(),
			new_validation_code: None,
			head_data: HeadData::from(vec![1, 2, 3, 4, 5]),
			processed_downward_messages: 0,
			hrmp_watermark: relay_parent.number,
		},
		collator: CollatorId::default(),
		collator_signature: CollatorSignature::default(),
		persisted_validation_data: PersistedValidationData {
			parent_head: constraints.required_parent.clone(),
			relay_parent_number: relay_parent.number,
			relay_parent_storage_root: relay_parent.storage_root,
			max_pov_size: constraints.max_pov_size,
		},
		pov_hash: Hash::repeat_byte(1),
		validation_code_hash: constraints.validation_code_hash,
	}
}

fn make_fragment(
	constraints: Constraints,
	candidate: ProspectiveCandidate,
) -> Result<Fragment, FragmentValidityError> {
	Fragment::new(make_relay_parent(), constraints, Arc::new(candidate))
}

#[test]
fn stack_modifications() {
	let para_a = ParaId::from(1u32);
	let para_b = ParaId::from(2u32);
	let para_c = ParaId::from(3u32);

	let a = ConstraintModifications {
		required_parent: None,
		hrmp_watermark: None,
		outbound_hrmp: [
			(
				para_a,
				OutboundHrmpChannelModification { bytes_submitted: 100, messages_submitted: 5 },
			),
			(
				para_b,
				OutboundHrmpChannelModification { bytes_submitted: 100, messages_submitted: 5 },
			),
		]
		.into_iter()
		.collect(),
		ump_messages_sent: 6,
		ump_bytes_sent: 1000,
		dmp_messages_processed: 5,
		code_upgrade_applied: true,
	};

	let b = ConstraintModifications {
		required_parent: None,
		hrmp_watermark: None,
		outbound_hrmp: [
			(
				para_b,
				OutboundHrmpChannelModification { bytes_submitted: 100, messages_submitted: 5 },
			),
			(
				para_c,
				OutboundHrmpChannelModification { bytes_submitted: 100, messages_submitted: 5 },
			),
		]
		.into_iter()
		.collect(),
		ump_messages_sent: 6,
		ump_bytes_sent: 1000,
		dmp_messages_processed: 5,
		code_upgrade_applied: true,
	};

	let mut c = a.clone();
	c.stack(&b);

	assert_eq!(
		c,
		ConstraintModifications {
			required_parent: None,
			hrmp_watermark: None,
			outbound_hrmp: [
				(
					para_a,
					OutboundHrmpChannelModification { bytes_submitted: 100, messages_submitted: 5 }
				),
				(
					para_b,
					OutboundHrmpChannelModification { bytes_submitted: 200, messages_submitted: 10 }
				),
				(
					para_c,
					OutboundHrmpChannelModification { bytes_submitted: 100, messages_submitted: 5 }
				),
			]
			.into_iter()
			.collect(),
			ump_messages_sent: 12,
			ump_bytes_sent: 2000,
			dmp_messages_processed: 10,
			code_upgrade_applied: true,
		},
	);

	let mut d = ConstraintModifications::identity();
	d.stack(&a);
	d.stack(&b);

	assert_eq!(c, d);
}

#[test]
fn stacking_overrides_parent_and_watermark() {
	let mut a = ConstraintModifications::identity();
	a.required_parent = Some(vec![1].into());
	a.hrmp_watermark = Some(HrmpWatermarkUpdate::Trunk(6));

	let mut b = ConstraintModifications::identity();
	b.required_parent = Some(vec![2].into());

	a.stack(&b);
	assert_eq!(a.required_parent, Some(vec![2].into()));
	assert_eq!(a.hrmp_watermark, Some(HrmpWatermarkUpdate::Trunk(6)));

	a.stack(&ConstraintModifications::identity());
	assert_eq!(a.required_parent, Some(vec![2].into()));
}

#[test]
fn identity_modifications_apply_cleanly() {
	let constraints = make_constraints();
	let modifications = ConstraintModifications::identity();

	assert_eq!(constraints.check_modifications(&modifications), Ok(()));
	assert_eq!(constraints.apply_modifications(&modifications), Ok(constraints));
}

#[test]
fn constraints_disallowed_trunk_watermark() {
	let constraints = make_constraints();
	let mut modifications = ConstraintModifications::identity();
	modifications.hrmp_watermark = Some(HrmpWatermarkUpdate::Trunk(7));

	assert_eq!(
		constraints.check_modifications(&modifications),
		Err(ModificationError::DisallowedHrmpWatermark(7)),
	);

	assert_eq!(
		constraints.apply_modifications(&modifications),
		Err(ModificationError::DisallowedHrmpWatermark(7)),
	);
}

#[test]
fn constraints_always_allow_head_watermark() {
	let constraints = make_constraints();
	let mut modifications = ConstraintModifications::identity();
	modifications.hrmp_watermark = Some(HrmpWatermarkUpdate::Head(7));

	assert_eq!(constraints.check_modifications(&modifications), Ok(()));

	let new_constraints = constraints.apply_modifications(&modifications).unwrap();
	assert_eq!(new_constraints.hrmp_inbound.valid_watermarks, vec![8]);
}

#[test]
fn constraints_exact_watermark_drains_inclusive() {
	let constraints = make_constraints();
	let mut modifications = ConstraintModifications::identity();
	modifications.hrmp_watermark = Some(HrmpWatermarkUpdate::Trunk(6));

	let new_constraints = constraints.apply_modifications(&modifications).unwrap();
	assert_eq!(new_constraints.hrmp_inbound.valid_watermarks, vec![8]);
}

#[test]
fn constraints_no_such_hrmp_channel() {
	let constraints = make_constraints();
	let mut modifications = ConstraintModifications::identity();
	let bad_para = ParaId::from(100u32);
	modifications.outbound_hrmp.insert(
		bad_para,
		OutboundHrmpChannelModification { bytes_submitted: 0, messages_submitted: 0 },
	);

	assert_eq!(
		constraints.check_modifications(&modifications),
		Err(ModificationError::NoSuchHrmpChannel(bad_para)),
	);

	assert_eq!(
		constraints.apply_modifications(&modifications),
		Err(ModificationError::NoSuchHrmpChannel(bad_para)),
	);
}

#[test]
fn constraints_hrmp_messages_overflow() {
	let constraints = make_constraints();
	let mut modifications = ConstraintModifications::identity();
	let para_a = ParaId::from(1u32);
	modifications.outbound_hrmp.insert(
		para_a,
		OutboundHrmpChannelModification { bytes_submitted: 0, messages_submitted: 11 },
	);

	assert_eq!(
		constraints.check_modifications(&modifications),
		Err(ModificationError::HrmpMessagesOverflow {
			para_id: para_a,
			messages_remaining: 10,
			messages_submitted: 11,
		}),
	);

	assert_eq!(
		constraints.apply_modifications(&modifications),
		Err(ModificationError::HrmpMessagesOverflow {
			para_id: para_a,
			messages_remaining: 10,
			messages_submitted: 11,
		}),
	);
}

#[test]
fn constraints_hrmp_bytes_overflow() {
	let constraints = make_constraints();
	let mut modifications = ConstraintModifications::identity();
	let para_a = ParaId::from(1u32);
	modifications.outbound_hrmp.insert(
		para_a,
		OutboundHrmpChannelModification { bytes_submitted: 513, messages_submitted: 1 },
	);

	assert_eq!(
		constraints.check_modifications(&modifications),
		Err(ModificationError::HrmpBytesOverflow {
			para_id: para_a,
			bytes_remaining: 512,
			bytes_submitted: 513,
		}),
	);
}

#[test]
fn constraints_hrmp_budget_is_subtracted() {
	let constraints = make_constraints();
	let mut modifications = ConstraintModifications::identity();
	let para_a = ParaId::from(1u32);
	modifications.outbound_hrmp.insert(
		para_a,
		OutboundHrmpChannelModification { bytes_submitted: 12, messages_submitted: 3 },
	);

	let new_constraints = constraints.apply_modifications(&modifications).unwrap();
	assert_eq!(
		new_constraints.hrmp_channels_out[&para_a],
		OutboundHrmpChannelLimitations { bytes_remaining: 500, messages_remaining: 7 },
	);
}

#[rstest]
#[case(11, 0, ModificationError::UmpMessagesOverflow { messages_remaining: 10, messages_submitted: 11 })]
#[case(1, 1025, ModificationError::UmpBytesOverflow { bytes_remaining: 1024, bytes_submitted: 1025 })]
fn constraints_ump_overflow(
	#[case] messages: usize,
	#[case] bytes: usize,
	#[case] expected: ModificationError,
) {
	let constraints = make_constraints();
	let mut modifications = ConstraintModifications::identity();
	modifications.ump_messages_sent = messages;
	modifications.ump_bytes_sent = bytes;

	assert_eq!(constraints.check_modifications(&modifications), Err(expected.clone()));
	assert_eq!(constraints.apply_modifications(&modifications), Err(expected));
}

#[test]
fn constraints_dmp_messages() {
	let mut constraints = make_constraints();
	let mut modifications = ConstraintModifications::identity();
	assert!(constraints.check_modifications(&modifications).is_ok());
	assert!(constraints.apply_modifications(&modifications).is_ok());

	modifications.dmp_messages_processed = 6;

	assert_eq!(
		constraints.check_modifications(&modifications),
		Err(ModificationError::DmpMessagesUnderflow {
			messages_remaining: 0,
			messages_processed: 6,
		}),
	);

	constraints.dmp_remaining_messages = vec![1, 4, 8, 10];
	modifications.dmp_messages_processed = 2;
	assert!(constraints.check_modifications(&modifications).is_ok());
	let constraints = constraints
		.apply_modifications(&modifications)
		.expect("modifications are valid");

	assert_eq!(&constraints.dmp_remaining_messages, &[8, 10]);
}

#[test]
fn constraints_nonexistent_code_upgrade() {
	let constraints = make_constraints();
	let mut modifications = ConstraintModifications::identity();
	modifications.code_upgrade_applied = true;

	assert_eq!(
		constraints.check_modifications(&modifications),
		Err(ModificationError::AppliedNonexistentCodeUpgrade),
	);

	assert_eq!(
		constraints.apply_modifications(&modifications),
		Err(ModificationError::AppliedNonexistentCodeUpgrade),
	);
}

#[test]
fn constraints_code_upgrade_replaces_hash() {
	let mut constraints = make_constraints();
	let new_code_hash = ValidationCodeHash::from(Hash::repeat_byte(7));
	constraints.future_validation_code = Some((6, new_code_hash));

	let mut modifications = ConstraintModifications::identity();
	modifications.code_upgrade_applied = true;

	let new_constraints = constraints.apply_modifications(&modifications).unwrap();
	assert_eq!(new_constraints.validation_code_hash, new_code_hash);
	assert_eq!(new_constraints.future_validation_code, None);
}

#[test]
fn candidate_valid_under_own_constraints() {
	let constraints = make_constraints();
	let relay_parent = make_relay_parent();
	let candidate = make_candidate(&constraints, &relay_parent);

	let fragment = make_fragment(constraints.clone(), candidate).unwrap();
	assert_eq!(fragment.relay_parent(), &relay_parent);
	assert_eq!(fragment.operating_constraints(), &constraints);

	let modifications = fragment.constraint_modifications();
	assert_eq!(modifications.required_parent, Some(HeadData::from(vec![1, 2, 3, 4, 5])));
	assert_eq!(modifications.hrmp_watermark, Some(HrmpWatermarkUpdate::Head(6)));
	assert!(!modifications.code_upgrade_applied);
}

#[test]
fn candidate_watermark_behind_relay_parent_is_trunk() {
	let constraints = make_constraints();
	let relay_parent = make_relay_parent();
	let mut candidate = make_candidate(&constraints, &relay_parent);
	candidate.commitments.hrmp_watermark = 5;

	// 5 is not a valid watermark.
	assert_eq!(
		make_fragment(constraints.clone(), candidate.clone()),
		Err(FragmentValidityError::OutputsInvalid(ModificationError::DisallowedHrmpWatermark(5))),
	);

	let mut constraints = constraints;
	constraints.hrmp_inbound.valid_watermarks = vec![5, 6];
	let fragment = make_fragment(constraints, candidate).unwrap();
	assert_eq!(
		fragment.constraint_modifications().hrmp_watermark,
		Some(HrmpWatermarkUpdate::Trunk(5)),
	);
}

#[test]
fn candidate_invalid_parent_head() {
	let constraints = make_constraints();
	let relay_parent = make_relay_parent();
	let mut candidate = make_candidate(&constraints, &relay_parent);
	candidate.persisted_validation_data.parent_head = vec![9].into();

	assert_matches!(
		make_fragment(constraints, candidate),
		Err(FragmentValidityError::PersistedValidationDataMismatch(_, _))
	);
}

#[test]
fn candidate_invalid_code_hash() {
	let constraints = make_constraints();
	let relay_parent = make_relay_parent();
	let mut candidate = make_candidate(&constraints, &relay_parent);
	let got_code = ValidationCodeHash::from(Hash::repeat_byte(3));
	candidate.validation_code_hash = got_code;

	assert_eq!(
		make_fragment(constraints.clone(), candidate),
		Err(FragmentValidityError::ValidationCodeMismatch(
			constraints.validation_code_hash,
			got_code,
		)),
	);
}

#[test]
fn fragment_relay_parent_too_old() {
	let mut constraints = make_constraints();
	constraints.min_relay_parent_number = 7;
	let relay_parent = make_relay_parent();
	let candidate = make_candidate(&constraints, &relay_parent);

	assert_eq!(
		make_fragment(constraints, candidate),
		Err(FragmentValidityError::RelayParentTooOld(7, 6)),
	);
}

#[test]
fn fragment_code_upgrade_restricted() {
	let mut constraints = make_constraints();
	let relay_parent = make_relay_parent();
	let mut candidate = make_candidate(&constraints, &relay_parent);

	constraints.upgrade_restriction = Some(UpgradeRestriction::Present);
	candidate.commitments.new_validation_code = Some(ValidationCode(vec![1, 2, 3]));

	assert_eq!(
		make_fragment(constraints, candidate),
		Err(FragmentValidityError::CodeUpgradeRestricted),
	);
}

#[test]
fn fragment_code_size_too_large() {
	let constraints = make_constraints();
	let relay_parent = make_relay_parent();
	let mut candidate = make_candidate(&constraints, &relay_parent);

	let max_code_size = constraints.max_code_size;
	candidate.commitments.new_validation_code = Some(vec![0; max_code_size + 1].into());

	assert_eq!(
		make_fragment(constraints, candidate),
		Err(FragmentValidityError::CodeSizeTooLarge(max_code_size, max_code_size + 1)),
	);
}

#[test]
fn fragment_dmp_advancement_rule() {
	let mut constraints = make_constraints();
	let relay_parent = make_relay_parent();
	let mut candidate = make_candidate(&constraints, &relay_parent);

	// Empty dmp queue is ok.
	assert!(make_fragment(constraints.clone(), candidate.clone()).is_ok());

	// Unprocessed message that was sent later is ok.
	constraints.dmp_remaining_messages = vec![relay_parent.number + 1];
	assert!(make_fragment(constraints.clone(), candidate.clone()).is_ok());

	for block_number in 0..=relay_parent.number {
		constraints.dmp_remaining_messages = vec![block_number];

		assert_eq!(
			make_fragment(constraints.clone(), candidate.clone()),
			Err(FragmentValidityError::DmpAdvancementRule),
		);
	}

	candidate.commitments.processed_downward_messages = 1;
	assert!(make_fragment(constraints, candidate).is_ok());
}

#[test]
fn fragment_ump_messages_overflow() {
	let constraints = make_constraints();
	let relay_parent = make_relay_parent();
	let mut candidate = make_candidate(&constraints, &relay_parent);

	let max_ump = constraints.max_ump_num_per_candidate;
	candidate.commitments.upward_messages = vec![vec![1]; max_ump + 1];

	assert_eq!(
		make_fragment(constraints, candidate),
		Err(FragmentValidityError::UmpMessagesPerCandidateOverflow {
			messages_allowed: max_ump,
			messages_submitted: max_ump + 1,
		}),
	);
}

#[test]
fn fragment_hrmp_messages_overflow() {
	let constraints = make_constraints();
	let relay_parent = make_relay_parent();
	let mut candidate = make_candidate(&constraints, &relay_parent);

	let max_hrmp = constraints.max_hrmp_num_per_candidate;
	candidate.commitments.horizontal_messages = (0..max_hrmp as u32 + 1)
		.map(|i| OutboundHrmpMessage { recipient: ParaId::from(i), data: vec![1, 2, 3] })
		.collect();

	assert_eq!(
		make_fragment(constraints, candidate),
		Err(FragmentValidityError::HrmpMessagesPerCandidateOverflow {
			messages_allowed: max_hrmp,
			messages_submitted: max_hrmp + 1,
		}),
	);
}

#[rstest]
#[case(vec![5, 3], 1)]
#[case(vec![1, 1], 1)]
#[case(vec![1, 2, 2], 2)]
fn fragment_hrmp_messages_descending_or_duplicate(
	#[case] recipients: Vec<u32>,
	#[case] bad_index: usize,
) {
	let constraints = make_constraints();
	let relay_parent = make_relay_parent();
	let mut candidate = make_candidate(&constraints, &relay_parent);

	candidate.commitments.horizontal_messages = recipients
		.into_iter()
		.map(|r| OutboundHrmpMessage { recipient: ParaId::from(r), data: vec![1, 2, 3] })
		.collect();

	assert_eq!(
		make_fragment(constraints, candidate),
		Err(FragmentValidityError::HrmpMessagesDescendingOrDuplicate(bad_index)),
	);
}

#[test]
fn fragment_outbound_hrmp_is_accounted() {
	let constraints = make_constraints();
	let relay_parent = make_relay_parent();
	let mut candidate = make_candidate(&constraints, &relay_parent);

	candidate.commitments.horizontal_messages = vec![
		OutboundHrmpMessage { recipient: ParaId::from(1u32), data: vec![1, 2, 3] },
		OutboundHrmpMessage { recipient: ParaId::from(2u32), data: vec![4] },
	];
	candidate.commitments.upward_messages = vec![vec![1, 2], vec![3]];

	let fragment = make_fragment(constraints, candidate).unwrap();
	let modifications = fragment.constraint_modifications();

	assert_eq!(
		modifications.outbound_hrmp[&ParaId::from(1u32)],
		OutboundHrmpChannelModification { bytes_submitted: 3, messages_submitted: 1 },
	);
	assert_eq!(
		modifications.outbound_hrmp[&ParaId::from(2u32)],
		OutboundHrmpChannelModification { bytes_submitted: 1, messages_submitted: 1 },
	);
	assert_eq!(modifications.ump_messages_sent, 2);
	assert_eq!(modifications.ump_bytes_sent, 3);
}

#[test]
fn fragment_hrmp_to_unknown_channel_is_invalid_output() {
	let constraints = make_constraints();
	let relay_parent = make_relay_parent();
	let mut candidate = make_candidate(&constraints, &relay_parent);

	candidate.commitments.horizontal_messages =
		vec![OutboundHrmpMessage { recipient: ParaId::from(9u32), data: vec![1] }];

	assert_eq!(
		make_fragment(constraints, candidate),
		Err(FragmentValidityError::OutputsInvalid(ModificationError::NoSuchHrmpChannel(
			ParaId::from(9u32)
		))),
	);
}

#[test]
fn fragment_applies_scheduled_code_upgrade() {
	let mut constraints = make_constraints();
	let relay_parent = make_relay_parent();
	let candidate = make_candidate(&constraints, &relay_parent);

	constraints.future_validation_code = Some((7, Hash::repeat_byte(9).into()));
	let fragment = make_fragment(constraints.clone(), candidate.clone()).unwrap();
	assert!(!fragment.constraint_modifications().code_upgrade_applied);

	constraints.future_validation_code = Some((6, Hash::repeat_byte(9).into()));
	let fragment = make_fragment(constraints, candidate).unwrap();
	assert!(fragment.constraint_modifications().code_upgrade_applied);
}
