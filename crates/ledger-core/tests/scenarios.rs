//! End-to-end scenarios against an in-memory repository (spec.md §8's
//! literal examples) plus the negative cases spec.md §7 calls out:
//! concurrent head races, malformed shares, and cross-tenant rejection.

use cellar_composition::{Amount, AttributeValue, Composition, Unit};
use cellar_ledger_core::commit::commit;
use cellar_ledger_core::model::{
    Container, ContainerId, ContainerState, ContainerType, OperationId, OperationType, StateId, TenantId,
};
use cellar_ledger_core::request::{FlowQuantityRequest, InputConsumption, OperationRequest, TargetFlowQuantity};
use cellar_ledger_core::CommitError;
use cellar_ledger_store_memory::InMemoryRepository;
use chrono::Utc;
use std::collections::BTreeMap;

fn scalar(attrs: &[(&str, i64)]) -> BTreeMap<String, AttributeValue> {
    attrs.iter().map(|(k, v)| (k.to_string(), AttributeValue::Scalar(Amount::from(*v)))).collect()
}

async fn seed_tank(
    repo: &InMemoryRepository,
    tenant: TenantId,
    container_type: ContainerType,
    qty: i64,
    unit: Unit,
    attrs: &[(&str, i64)],
) -> (ContainerId, StateId) {
    let container = Container {
        id: ContainerId::new(),
        tenant_id: tenant,
        name: "container".to_string(),
        container_type,
        capacity: None,
        created_at: Utc::now(),
    };
    let container_id = container.id;
    repo.create_container(container).await;

    let state = ContainerState {
        id: StateId::new(),
        container_id,
        composition: Composition { qty: Amount::from(qty), unit, attributes: scalar(attrs) },
        timestamp: Utc::now(),
        is_head: true,
    };
    let state_id = state.id;
    repo.seed_state(state).await;
    (container_id, state_id)
}

fn base_request(tenant: TenantId, op_type: OperationType, from_containers: Vec<ContainerId>) -> OperationRequest {
    OperationRequest {
        id: OperationId::new(),
        op_type,
        tenant_id: tenant,
        timestamp: Utc::now(),
        description: None,
        from_containers,
        flow_quantities: vec![],
        input_consumption: vec![],
        target_flow_quantities: vec![],
    }
}

#[tokio::test]
async fn scenario_transfer_50_gal() {
    let repo = InMemoryRepository::new();
    let tenant = TenantId::new();
    let (a_id, a_state) = seed_tank(&repo, tenant, ContainerType::Tank, 1000, Unit::Gal, &[]).await;
    let (b_id, _b_state) = seed_tank(&repo, tenant, ContainerType::Tank, 800, Unit::Gal, &[]).await;

    let mut request = base_request(tenant, OperationType::Transfer, vec![a_id, b_id]);
    request.flow_quantities = vec![FlowQuantityRequest {
        from_state_id: a_state,
        to_container_id: b_id,
        qty: Amount::from(50),
        unit: None,
    }];

    let op = commit(request, &repo).await.unwrap();
    let a_out = op.outputs.iter().find(|o| o.container_id == a_id).unwrap();
    let b_out = op.outputs.iter().find(|o| o.container_id == b_id).unwrap();
    assert_eq!(a_out.composition.qty, Amount::from(950));
    assert_eq!(b_out.composition.qty, Amount::from(850));
    assert_eq!(op.flows.len(), 3);
}

#[tokio::test]
async fn scenario_loss_transfer_skips_nominal_dollars() {
    let repo = InMemoryRepository::new();
    let tenant = TenantId::new();
    let (a_id, a_state) = seed_tank(
        &repo,
        tenant,
        ContainerType::Tank,
        1000,
        Unit::Gal,
        &[("realDollars", 10_000), ("nominalDollars", 10_000)],
    )
    .await;
    let (loss_id, _) = seed_tank(&repo, tenant, ContainerType::Loss, 0, Unit::Gal, &[]).await;

    let mut request = base_request(tenant, OperationType::Loss, vec![a_id]);
    request.from_containers = vec![a_id];
    request.flow_quantities = vec![FlowQuantityRequest {
        from_state_id: a_state,
        to_container_id: loss_id,
        qty: Amount::from(100),
        unit: None,
    }];
    // loss container has no prior head, so it is not an input; commit only
    // resolves heads for from_containers. The loss output shell is created
    // fresh by the builder.
    let op = commit(request, &repo).await.unwrap();

    let a_out = op.outputs.iter().find(|o| o.container_id == a_id).unwrap();
    assert_eq!(a_out.composition.qty, Amount::from(900));
    assert_eq!(a_out.composition.attributes["realDollars"], AttributeValue::Scalar(Amount::from(9_000)));
    assert_eq!(a_out.composition.attributes["nominalDollars"], AttributeValue::Scalar(Amount::from(10_000)));

    let loss_out = op.outputs.iter().find(|o| o.container_id == loss_id).unwrap();
    assert_eq!(loss_out.composition.qty, Amount::from(100));
    assert_eq!(loss_out.composition.attributes["realDollars"], AttributeValue::Scalar(Amount::from(1_000)));
    assert!(!loss_out.composition.attributes.contains_key("nominalDollars"));
}

#[tokio::test]
async fn scenario_gain_increases_volume_and_nominal_only() {
    let repo = InMemoryRepository::new();
    let tenant = TenantId::new();
    let (a_id, a_state) = seed_tank(
        &repo,
        tenant,
        ContainerType::Tank,
        1000,
        Unit::Gal,
        &[("realDollars", 10_000), ("nominalDollars", 10_000)],
    )
    .await;
    let (gain_id, gain_state) =
        seed_tank(&repo, tenant, ContainerType::Gain, 100, Unit::Gal, &[("nominalDollars", 1_000)]).await;

    let mut request = base_request(tenant, OperationType::Gain, vec![a_id, gain_id]);
    request.flow_quantities = vec![FlowQuantityRequest {
        from_state_id: gain_state,
        to_container_id: a_id,
        qty: Amount::from(100),
        unit: None,
    }];

    let op = commit(request, &repo).await.unwrap();
    let a_out = op.outputs.iter().find(|o| o.container_id == a_id).unwrap();
    assert_eq!(a_out.composition.qty, Amount::from(1_100));
    assert_eq!(a_out.composition.attributes["realDollars"], AttributeValue::Scalar(Amount::from(10_000)));
    assert_eq!(a_out.composition.attributes["nominalDollars"], AttributeValue::Scalar(Amount::from(11_000)));
    let _ = a_state;
}

#[tokio::test]
async fn scenario_blend_two_varietals() {
    let repo = InMemoryRepository::new();
    let tenant = TenantId::new();
    let (a_id, a_state) = {
        let container = Container {
            id: ContainerId::new(),
            tenant_id: tenant,
            name: "A".into(),
            container_type: ContainerType::Tank,
            capacity: None,
            created_at: Utc::now(),
        };
        let id = container.id;
        repo.create_container(container).await;
        let mut attrs = BTreeMap::new();
        attrs.insert(
            "varietal".to_string(),
            AttributeValue::Nested(BTreeMap::from([("CHARD".to_string(), Amount::from(502))])),
        );
        let state = ContainerState {
            id: StateId::new(),
            container_id: id,
            composition: Composition { qty: Amount::from(502), unit: Unit::Gal, attributes: attrs },
            timestamp: Utc::now(),
            is_head: true,
        };
        let state_id = state.id;
        repo.seed_state(state).await;
        (id, state_id)
    };
    let (b_id, b_state) = {
        let container = Container {
            id: ContainerId::new(),
            tenant_id: tenant,
            name: "B".into(),
            container_type: ContainerType::Tank,
            capacity: None,
            created_at: Utc::now(),
        };
        let id = container.id;
        repo.create_container(container).await;
        let mut attrs = BTreeMap::new();
        attrs.insert(
            "varietal".to_string(),
            AttributeValue::Nested(BTreeMap::from([("PINOT".to_string(), Amount::from(300))])),
        );
        let state = ContainerState {
            id: StateId::new(),
            container_id: id,
            composition: Composition { qty: Amount::from(300), unit: Unit::Gal, attributes: attrs },
            timestamp: Utc::now(),
            is_head: true,
        };
        let state_id = state.id;
        repo.seed_state(state).await;
        (id, state_id)
    };
    let (c_id, _c_state) = seed_tank(&repo, tenant, ContainerType::Tank, 0, Unit::Gal, &[]).await;

    let mut request = base_request(tenant, OperationType::Blend, vec![a_id, b_id]);
    request.flow_quantities = vec![
        FlowQuantityRequest { from_state_id: a_state, to_container_id: c_id, qty: Amount::from(502), unit: None },
        FlowQuantityRequest { from_state_id: b_state, to_container_id: c_id, qty: Amount::from(300), unit: None },
    ];

    let op = commit(request, &repo).await.unwrap();
    let c_out = op.outputs.iter().find(|o| o.container_id == c_id).unwrap();
    assert_eq!(c_out.composition.qty, Amount::from(802));
    if let AttributeValue::Nested(map) = &c_out.composition.attributes["varietal"] {
        assert_eq!(map["CHARD"], Amount::from(502));
        assert_eq!(map["PINOT"], Amount::from(300));
    } else {
        panic!("expected nested varietal");
    }
}

#[tokio::test]
async fn scenario_press_weigh_tag_into_empty_tank() {
    let repo = InMemoryRepository::new();
    let tenant = TenantId::new();
    let (tag_id, tag_state) = seed_tank(&repo, tenant, ContainerType::WeighTag, 2000, Unit::Lbs, &[]).await;
    let (tank_id, _) = seed_tank(&repo, tenant, ContainerType::Tank, 0, Unit::Gal, &[]).await;

    let mut request = base_request(tenant, OperationType::Press, vec![tag_id]);
    request.flow_quantities = vec![FlowQuantityRequest {
        from_state_id: tag_state,
        to_container_id: tank_id,
        qty: Amount::from(150),
        unit: Some(Unit::Gal),
    }];
    request.target_flow_quantities = vec![TargetFlowQuantity {
        container_id: tank_id,
        qty: Amount::from(150),
        unit: Unit::Gal,
    }];

    let op = commit(request, &repo).await.unwrap();
    let tank_out = op.outputs.iter().find(|o| o.container_id == tank_id).unwrap();
    assert_eq!(tank_out.composition.qty, Amount::from(150));
    assert_eq!(tank_out.composition.unit, Unit::Gal);
    assert_eq!(
        tank_out.composition.attributes["effectivePounds"],
        AttributeValue::Scalar(Amount::from(2000))
    );
}

#[tokio::test]
async fn concurrent_commits_racing_on_the_same_head_lose_with_input_not_current() {
    let repo = InMemoryRepository::new();
    let tenant = TenantId::new();
    let (a_id, a_state) = seed_tank(&repo, tenant, ContainerType::Tank, 1000, Unit::Gal, &[]).await;
    let (b_id, _) = seed_tank(&repo, tenant, ContainerType::Tank, 0, Unit::Gal, &[]).await;

    let mut first = base_request(tenant, OperationType::Transfer, vec![a_id, b_id]);
    first.flow_quantities = vec![FlowQuantityRequest {
        from_state_id: a_state,
        to_container_id: b_id,
        qty: Amount::from(100),
        unit: None,
    }];
    let mut second = first.clone();
    second.id = OperationId::new();

    commit(first, &repo).await.unwrap();
    let result = commit(second, &repo).await;
    assert!(matches!(result, Err(CommitError::InputNotCurrent)));
}

#[tokio::test]
async fn cross_tenant_reference_is_rejected() {
    let repo = InMemoryRepository::new();
    let tenant_a = TenantId::new();
    let tenant_b = TenantId::new();
    let (a_id, a_state) = seed_tank(&repo, tenant_a, ContainerType::Tank, 1000, Unit::Gal, &[]).await;
    let (b_id, _) = seed_tank(&repo, tenant_b, ContainerType::Tank, 0, Unit::Gal, &[]).await;

    let mut request = base_request(tenant_a, OperationType::Transfer, vec![a_id]);
    request.flow_quantities = vec![FlowQuantityRequest {
        from_state_id: a_state,
        to_container_id: b_id,
        qty: Amount::from(100),
        unit: None,
    }];

    let result = commit(request, &repo).await;
    assert!(matches!(result, Err(CommitError::CrossTenant)));
}

#[tokio::test]
async fn inconsistent_shares_surfaces_as_builder_error() {
    let repo = InMemoryRepository::new();
    let tenant = TenantId::new();
    let (a_id, a_state) = seed_tank(&repo, tenant, ContainerType::Tank, 1000, Unit::Gal, &[]).await;
    let (b_id, _) = seed_tank(&repo, tenant, ContainerType::Tank, 0, Unit::Gal, &[]).await;

    let mut request = base_request(tenant, OperationType::Transfer, vec![a_id, b_id]);
    // The explicit flow declares 700 consumed, but the override claims
    // only 500 was consumed; auto-balance then adds a 500 remainder flow,
    // so declared shares (700 + 500 = 1200) no longer sum to the source's
    // 1000 qty.
    request.flow_quantities = vec![FlowQuantityRequest {
        from_state_id: a_state,
        to_container_id: b_id,
        qty: Amount::from(700),
        unit: None,
    }];
    request.input_consumption = vec![InputConsumption { state_id: a_state, qty: Amount::from(500) }];

    let result = commit(request, &repo).await;
    assert!(matches!(result, Err(CommitError::Composition(_))));
}

/// spec.md §8 scenario 4: a gain followed by a loss, two independent
/// commits against the same tank, each seeing the other's output head.
#[tokio::test]
async fn scenario_gain_then_loss_chains_across_two_commits() {
    let repo = InMemoryRepository::new();
    let tenant = TenantId::new();
    let (a_id, a_state) =
        seed_tank(&repo, tenant, ContainerType::Tank, 1000, Unit::Gal, &[("nominalDollars", 10_000)]).await;
    let (gain_id, gain_state) =
        seed_tank(&repo, tenant, ContainerType::Gain, 100, Unit::Gal, &[("nominalDollars", 1_000)]).await;
    let (loss_id, _) = seed_tank(&repo, tenant, ContainerType::Loss, 0, Unit::Gal, &[]).await;

    let mut gain_request = base_request(tenant, OperationType::Gain, vec![a_id, gain_id]);
    gain_request.flow_quantities = vec![FlowQuantityRequest {
        from_state_id: gain_state,
        to_container_id: a_id,
        qty: Amount::from(100),
        unit: None,
    }];
    let gain_op = commit(gain_request, &repo).await.unwrap();
    let a_after_gain = gain_op.outputs.iter().find(|o| o.container_id == a_id).unwrap();
    assert_eq!(a_after_gain.composition.qty, Amount::from(1_100));
    assert_eq!(
        a_after_gain.composition.attributes["nominalDollars"],
        AttributeValue::Scalar(Amount::from(11_000))
    );

    // The tank's head has moved; this second commit must read it fresh,
    // not the original seeded state.
    let mut loss_request = base_request(tenant, OperationType::Loss, vec![a_id]);
    loss_request.flow_quantities = vec![FlowQuantityRequest {
        from_state_id: a_after_gain.id,
        to_container_id: loss_id,
        qty: Amount::from(110),
        unit: None,
    }];
    let loss_op = commit(loss_request, &repo).await.unwrap();
    let a_final = loss_op.outputs.iter().find(|o| o.container_id == a_id).unwrap();
    assert_eq!(a_final.composition.qty, Amount::from(990));
    assert_eq!(
        a_final.composition.attributes["nominalDollars"],
        AttributeValue::Scalar(Amount::from(11_000))
    );

    let loss_out = loss_op.outputs.iter().find(|o| o.container_id == loss_id).unwrap();
    assert_eq!(loss_out.composition.qty, Amount::from(110));
    assert!(!loss_out.composition.attributes.contains_key("nominalDollars"));

    // The stale seeded state is no longer usable as an input reference.
    let mut stale_request = base_request(tenant, OperationType::Loss, vec![a_id]);
    stale_request.flow_quantities = vec![FlowQuantityRequest {
        from_state_id: a_state,
        to_container_id: loss_id,
        qty: Amount::from(10),
        unit: None,
    }];
    let stale_result = commit(stale_request, &repo).await;
    assert!(matches!(stale_result, Err(CommitError::InputNotCurrent)));
}

/// spec.md §4.5: a barrel-group output state gets the *live* membership
/// materialized onto it at commit time, independent of later membership
/// changes.
#[tokio::test]
async fn barrel_group_output_snapshots_live_membership() {
    let repo = InMemoryRepository::new();
    let tenant = TenantId::new();
    let (source_id, source_state) = seed_tank(&repo, tenant, ContainerType::Tank, 200, Unit::Gal, &[]).await;
    let (group_id, _) = seed_tank(&repo, tenant, ContainerType::BarrelGroup, 0, Unit::Gal, &[]).await;
    let (barrel_1, _) = seed_tank(&repo, tenant, ContainerType::Barrel, 0, Unit::Gal, &[]).await;
    let (barrel_2, _) = seed_tank(&repo, tenant, ContainerType::Barrel, 0, Unit::Gal, &[]).await;

    repo.set_group_members(group_id, vec![barrel_1, barrel_2]).await;

    let mut request = base_request(tenant, OperationType::Topping, vec![source_id]);
    request.flow_quantities = vec![FlowQuantityRequest {
        from_state_id: source_state,
        to_container_id: group_id,
        qty: Amount::from(50),
        unit: None,
    }];
    let op = commit(request, &repo).await.unwrap();
    let group_out = op.outputs.iter().find(|o| o.container_id == group_id).unwrap();

    let snapshot = repo.group_snapshot(group_out.id).await.expect("barrel group output is snapshotted");
    let barrels: std::collections::BTreeSet<ContainerId> = snapshot.into_iter().map(|m| m.barrel).collect();
    assert_eq!(barrels, std::collections::BTreeSet::from([barrel_1, barrel_2]));

    // Changing live membership afterwards does not retroactively touch the
    // snapshot already attached to `group_out`.
    repo.set_group_members(group_id, vec![barrel_1]).await;
    let snapshot_again = repo.group_snapshot(group_out.id).await.unwrap();
    assert_eq!(snapshot_again.len(), 2);
}
