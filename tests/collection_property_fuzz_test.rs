use proptest::collection::vec;
use proptest::prelude::*;
use proptest::test_runner::{FileFailurePersistence, TestCaseResult};

use script_bridge::{
    BridgeContext, CollectionState, EngineHandle, Error, EventTargetState, ScriptValue,
};

const COLLECTION_PROPTEST_REGRESSION_FILE: &str =
    "tests/proptest-regressions/collection_property_fuzz_test.txt";
const DEFAULT_COLLECTION_PROPTEST_CASES: u32 = 128;

const NODE_POOL_SIZE: usize = 8;

fn env_proptest_cases(var_name: &str, default_cases: u32) -> u32 {
    std::env::var(var_name)
        .ok()
        .and_then(|raw| raw.parse::<u32>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default_cases)
}

fn collection_proptest_cases() -> u32 {
    std::env::var("SCRIPT_BRIDGE_COLLECTION_PROPTEST_CASES")
        .ok()
        .and_then(|raw| raw.parse::<u32>().ok())
        .filter(|value| *value > 0)
        .unwrap_or_else(|| {
            env_proptest_cases(
                "SCRIPT_BRIDGE_PROPTEST_CASES",
                DEFAULT_COLLECTION_PROPTEST_CASES,
            )
        })
}

#[derive(Clone, Debug)]
enum CollectionAction {
    Add { node: usize, before: Option<usize> },
    Remove(usize),
    Item(usize),
}

fn collection_action_strategy() -> BoxedStrategy<CollectionAction> {
    prop_oneof![
        4 => (0..NODE_POOL_SIZE, proptest::option::of(0usize..12))
            .prop_map(|(node, before)| CollectionAction::Add { node, before }),
        3 => (0usize..12).prop_map(CollectionAction::Remove),
        3 => (0usize..12).prop_map(CollectionAction::Item),
    ]
    .boxed()
}

fn collection_action_sequence_strategy() -> BoxedStrategy<Vec<CollectionAction>> {
    vec(collection_action_strategy(), 1..=32).boxed()
}

/// Drives the bridged collection through its script-visible surface and
/// checks every step against a plain `Vec` model.
fn assert_collection_matches_model(actions: &[CollectionAction]) -> TestCaseResult {
    let mut ctx = BridgeContext::new();
    let pool: Vec<EngineHandle> = (0..NODE_POOL_SIZE)
        .map(|i| EventTargetState::materialize(&mut ctx, Some(&format!("n{i}"))))
        .collect();
    // Never added to the collection; used as a guaranteed-invalid
    // before-reference.
    let outsider = EventTargetState::materialize(&mut ctx, Some("outsider"));
    let collection = CollectionState::materialize(&mut ctx, Vec::new());
    let mut model: Vec<EngineHandle> = Vec::new();

    for (step, action) in actions.iter().enumerate() {
        match action {
            CollectionAction::Add { node, before } => {
                let node = pool[*node];
                match before {
                    None => {
                        let outcome =
                            ctx.call(collection, "add", &[ScriptValue::Object(node)]);
                        prop_assert!(
                            outcome.is_ok(),
                            "append failed at step {step}: {outcome:?}, actions={actions:?}"
                        );
                        model.push(node);
                    }
                    Some(slot) if *slot < model.len() => {
                        let reference = model[*slot];
                        let outcome = ctx.call(
                            collection,
                            "add",
                            &[ScriptValue::Object(node), ScriptValue::Object(reference)],
                        );
                        prop_assert!(
                            outcome.is_ok(),
                            "insert-before failed at step {step}: {outcome:?}, actions={actions:?}"
                        );
                        let position = model
                            .iter()
                            .position(|&member| member == reference)
                            .expect("reference came from the model");
                        model.insert(position, node);
                    }
                    Some(_) => {
                        let outcome = ctx.call(
                            collection,
                            "add",
                            &[ScriptValue::Object(node), ScriptValue::Object(outsider)],
                        );
                        prop_assert!(
                            matches!(outcome, Err(Error::InvalidReference { .. })),
                            "invalid reference not rejected at step {step}: {outcome:?}"
                        );
                    }
                }
            }
            CollectionAction::Remove(slot) => {
                let outcome =
                    ctx.call(collection, "remove", &[ScriptValue::Number(*slot as i64)]);
                if *slot < model.len() {
                    prop_assert!(
                        outcome.is_ok(),
                        "remove failed at step {step}: {outcome:?}, actions={actions:?}"
                    );
                    model.remove(*slot);
                } else {
                    prop_assert!(
                        matches!(outcome, Err(Error::Index { .. })),
                        "out-of-range remove not rejected at step {step}: {outcome:?}"
                    );
                }
            }
            CollectionAction::Item(slot) => {
                let outcome = ctx.call(collection, "item", &[ScriptValue::Number(*slot as i64)]);
                prop_assert!(
                    outcome.is_ok(),
                    "item failed at step {step}: {outcome:?}, actions={actions:?}"
                );
                let expected = model
                    .get(*slot)
                    .map(|&member| ScriptValue::Object(member))
                    .unwrap_or(ScriptValue::Undefined);
                prop_assert_eq!(outcome.unwrap(), expected);
            }
        }

        let length = ctx
            .get(collection, "length")
            .map_err(|err| proptest::test_runner::TestCaseError::fail(format!("{err:?}")))?;
        prop_assert_eq!(
            length,
            Some(ScriptValue::Number(model.len() as i64)),
            "length diverged from the model after step {}: {:?}",
            step,
            action
        );
    }

    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: collection_proptest_cases(),
        failure_persistence: Some(Box::new(
            FileFailurePersistence::Direct(COLLECTION_PROPTEST_REGRESSION_FILE),
        )),
        .. ProptestConfig::default()
    })]

    #[test]
    fn collection_mutations_agree_with_a_vec_model(
        actions in collection_action_sequence_strategy()
    ) {
        assert_collection_matches_model(&actions)?;
    }
}
