//! Property-based tests for reconcile idempotence.
//!
//! Properties verified:
//! - Repeated Speaker passes without a spec change issue at most one write
//! - Repeated Proposal passes on a final submission issue no remote call

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::sync::Arc;

use cfp_core::{
    Conditioned, ObjectKey, Proposal, ProposalSpec, ResourceKind, Speaker, SpeakerRef,
    SpeakerSpec,
};
use cfp_reconciler::{ProposalReconciler, Reconciler, SpeakerReconciler};
use cfp_registry::InMemoryRegistry;
use cfp_store::{InMemoryStore, ObjectStore};
use proptest::prelude::*;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime creation should succeed")
}

fn speaker_spec() -> impl Strategy<Value = SpeakerSpec> {
    (
        "[A-Z][a-z]{1,12}",
        "[a-zA-Z ,.]{0,40}",
        proptest::option::of("[a-z]{1,8}@[a-z]{1,8}\\.(com|org|dev)"),
    )
        .prop_map(|(name, bio, email)| {
            let spec = SpeakerSpec::new(name).with_bio(bio);
            match email {
                Some(email) => spec.with_email(email),
                None => spec,
            }
        })
}

// ==========================================================================
// PROPERTY: Speaker idempotence
// ==========================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Property: once a Speaker converged, further passes issue no writes,
    /// and the whole sequence issues exactly one create.
    #[test]
    fn prop_speaker_passes_write_once(spec in speaker_spec(), extra_passes in 1usize..5) {
        let rt = runtime();
        let (writes, ready) = rt.block_on(async {
            let store = InMemoryStore::<Speaker>::new_arc();
            let registry = Arc::new(InMemoryRegistry::new());
            let reconciler = SpeakerReconciler::new(store.clone(), registry.clone(), "prop");
            let key = ObjectKey::new("ns", "speaker");
            store.create(Speaker::new("ns", "speaker", spec)).await.unwrap();

            // Finalizer pass, then the creating pass.
            reconciler.reconcile(&key).await.unwrap();
            reconciler.reconcile(&key).await.unwrap();
            for _ in 0..extra_passes {
                reconciler.reconcile(&key).await.unwrap();
            }

            let obj = store.get(&key).await.unwrap().unwrap();
            (registry.calls(ResourceKind::Speaker).await.writes(), obj.is_ready())
        });

        prop_assert_eq!(writes, 1);
        prop_assert!(ready);
    }
}

// ==========================================================================
// PROPERTY: Final submissions are frozen
// ==========================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Property: after a Proposal became final, no spec edit reaches the registry.
    #[test]
    fn prop_final_proposal_is_frozen(
        titles in proptest::collection::vec("[A-Za-z ]{1,50}", 1..5),
    ) {
        let rt = runtime();
        let calls = rt.block_on(async {
            let speakers = InMemoryStore::<Speaker>::new_arc();
            let proposals = InMemoryStore::<Proposal>::new_arc();
            let registry = Arc::new(InMemoryRegistry::new());

            let speaker_key = ObjectKey::new("ns", "Ada");
            let speaker_reconciler =
                SpeakerReconciler::new(speakers.clone(), registry.clone(), "prop");
            speakers
                .create(Speaker::new("ns", "Ada", SpeakerSpec::new("Ada")))
                .await
                .unwrap();
            speaker_reconciler.reconcile(&speaker_key).await.unwrap();
            speaker_reconciler.reconcile(&speaker_key).await.unwrap();

            let key = ObjectKey::new("ns", "talk");
            let reconciler = ProposalReconciler::new(
                proposals.clone(),
                speakers.clone(),
                registry.clone(),
                "prop",
            );
            let spec = ProposalSpec::new("T", "A", SpeakerRef::new("Ada")).with_final(true);
            proposals.create(Proposal::new("ns", "talk", spec)).await.unwrap();
            reconciler.reconcile(&key).await.unwrap();
            reconciler.reconcile(&key).await.unwrap();
            registry.reset_calls().await;

            for title in titles {
                let mut obj = proposals.get(&key).await.unwrap().unwrap();
                obj.spec.title = title;
                proposals.update(obj).await.unwrap();
                reconciler.reconcile(&key).await.unwrap();
            }
            registry.calls(ResourceKind::Proposal).await.total()
        });

        prop_assert_eq!(calls, 0);
    }
}
