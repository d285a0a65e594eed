#![allow(missing_docs)]

use proptest::prelude::*;
use recital::{
    FragmentStatus, NarrationOptions, NarrationQuery, NarrationRegistry, TextSource, ThreadKey,
};

#[derive(Debug, thiserror::Error)]
enum StepError {
    #[error("step {0} failed")]
    Failed(usize),
    #[error(transparent)]
    Narration(#[from] recital::NarrationError),
}

fn nest(
    registry: &NarrationRegistry,
    level: usize,
    depth: usize,
    fail_at: Option<usize>,
) -> Result<usize, StepError> {
    registry
        .narrate(TextSource::computed(move || format!("level {level}")))
        .call(|| {
            if fail_at == Some(level) {
                Err(StepError::Failed(level))
            } else if level + 1 < depth {
                nest(registry, level + 1, depth, fail_at).map(|n| n + 1)
            } else {
                Ok(1)
            }
        })
}

fn registry(auto_prune: bool) -> NarrationRegistry {
    NarrationRegistry::with_defaults(NarrationOptions {
        auto_prune,
        ..NarrationOptions::default()
    })
}

proptest! {
    #[test]
    fn success_restores_depth(depth in 1usize..20) {
        let registry = registry(true);
        prop_assert_eq!(nest(&registry, 0, depth, None).unwrap(), depth);
        prop_assert_eq!(registry.depth(ThreadKey::Current).unwrap(), 0);
    }

    #[test]
    fn failure_keeps_one_fragment_per_level(depth in 1usize..20, fail in 0usize..20) {
        let fail_at = fail % depth;
        let registry = registry(true);
        prop_assert!(nest(&registry, 0, depth, Some(fail_at)).is_err());

        let texts = registry.get_narration(&NarrationQuery::new()).unwrap();
        prop_assert_eq!(texts.len(), fail_at + 1);
        for (level, text) in texts.iter().enumerate() {
            let expected_prefix = format!("level {level}");
            prop_assert!(text.starts_with(&expected_prefix));
            prop_assert_eq!(text.contains("was raised"), level == fail_at);
        }

        let copies = registry.copy_narration(ThreadKey::Current, false).unwrap();
        let raised = copies.iter().filter(|c| c.status == FragmentStatus::Raised).count();
        prop_assert_eq!(raised, 1);
        prop_assert!(copies[..fail_at].iter().all(|c| c.status == FragmentStatus::PassedThrough));
    }

    #[test]
    fn without_auto_prune_every_call_is_kept(depth in 1usize..12) {
        let registry = registry(false);
        let _ = nest(&registry, 0, depth, None).unwrap();
        let copies = registry.copy_narration(ThreadKey::Current, false).unwrap();
        prop_assert_eq!(copies.len(), depth);
        prop_assert!(copies.iter().all(|c| c.status == FragmentStatus::Completed));
    }

    #[test]
    fn tag_filter_never_hides_untagged(tags in proptest::collection::vec(prop_oneof!["a", "b", "c"], 0..4)) {
        let registry = registry(true);
        let out: anyhow::Result<()> = registry.narrate("plain").call(|| {
            registry
                .narrate("tagged a")
                .tag("a")
                .call(|| Err(anyhow::anyhow!("stop")))
        });
        prop_assert!(out.is_err());
        let texts = registry
            .get_narration(&NarrationQuery::new().with_tags(tags.clone()))
            .unwrap();
        prop_assert_eq!(&texts[0], "plain");
        let wants_a = tags.is_empty() || tags.iter().any(|t| t == "a");
        prop_assert_eq!(texts.len(), if wants_a { 2 } else { 1 });
    }
}
