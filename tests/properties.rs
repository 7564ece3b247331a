#![allow(non_snake_case)]
use proptest::prelude::*;
use serde_json::json;
use std::sync::Arc;
use tictactoe_client::{
    CellView,
    GameStore,
    TransactionId,
    entity_cache::EntityCache,
    generated_abi::{
        Cell,
        EntityId,
        GameState,
        GameWon,
        ModelName,
        ModelPayload,
        Player,
        Position,
    },
    ledger::{
        Mutation,
        OptimisticLedger,
    },
    query::SubscriptionQuery,
    reconciler::merge,
};

fn player() -> impl Strategy<Value = Player> {
    prop_oneof![Just(Player::None), Just(Player::X), Just(Player::O)]
}

fn mark() -> impl Strategy<Value = Player> {
    prop_oneof![Just(Player::X), Just(Player::O)]
}

prop_compose! {
    fn position()(x in 0u8..3, y in 0u8..3) -> Position {
        Position::new(x, y).unwrap()
    }
}

prop_compose! {
    fn board()(players in prop::collection::vec(player(), 9)) -> Vec<Cell> {
        Position::all()
            .zip(players)
            .map(|(position, player)| Cell { position, player })
            .collect()
    }
}

fn set_to(player: Player) -> Mutation {
    Arc::new(move |cell: Cell| Cell { player, ..cell })
}

fn fill(cache: &mut EntityCache, board: &[Cell]) {
    for cell in board {
        cache.upsert(EntityId::for_cell(cell.position), ModelPayload::Cell(*cell));
    }
}

fn query() -> SubscriptionQuery {
    SubscriptionQuery::for_game(0, None)
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 10, .. ProptestConfig::default() })]

    #[test]
    fn upsert__identical_payload__leaves_view_unchanged(
        board in board(),
        repeats in 1usize..4,
    ) {
        // given
        let mut cache = EntityCache::new();
        fill(&mut cache, &board);
        let before = merge(&query(), &cache, []);

        // when
        for _ in 0..repeats {
            fill(&mut cache, &board);
        }

        // then
        prop_assert_eq!(merge(&query(), &cache, []), before);
    }

    #[test]
    fn merge__pending_entries__cell_shows_latest_prediction(
        board in board(),
        moves in prop::collection::vec((position(), mark()), 1..8),
    ) {
        // given
        let mut cache = EntityCache::new();
        fill(&mut cache, &board);
        let mut ledger = OptimisticLedger::new();

        // when
        for (raw, (position, player)) in moves.iter().enumerate() {
            ledger
                .begin(
                    TransactionId::from_raw(raw as u128),
                    EntityId::for_cell(*position),
                    set_to(*player),
                    0,
                )
                .unwrap();
        }
        let view = merge(&query(), &cache, ledger.overlays());

        // then
        for (position, authoritative) in board.iter().map(|cell| (cell.position, cell.player)) {
            let latest = moves
                .iter()
                .enumerate()
                .rev()
                .find(|(_, (target, _))| *target == position);
            let expected = match latest {
                Some((raw, (_, player))) => CellView::Optimistic {
                    player: *player,
                    transaction_id: TransactionId::from_raw(raw as u128),
                },
                None => CellView::Authoritative(authoritative),
            };
            prop_assert_eq!(view.cell(position), expected);
        }
    }

    #[test]
    fn revert__every_entry__restores_authoritative_view(
        board in board(),
        moves in prop::collection::vec((position(), mark()), 1..8),
        order in any::<prop::sample::Index>(),
    ) {
        // given
        let store = GameStore::new(query());
        for cell in &board {
            store.upsert(EntityId::for_cell(cell.position), ModelPayload::Cell(*cell));
        }
        let before = store.view();
        let mut ids = Vec::new();
        for (raw, (position, player)) in moves.iter().enumerate() {
            let tx = TransactionId::from_raw(raw as u128);
            store.begin(tx, EntityId::for_cell(*position), set_to(*player)).unwrap();
            ids.push(tx);
        }

        // when
        let len = ids.len();
        ids.rotate_left(order.index(len));
        for tx in ids {
            store.revert(tx).unwrap();
        }

        // then
        prop_assert_eq!(store.view(), before);
    }

    #[test]
    fn confirm__after_matching_upsert__cell_stays_authoritative(
        target in position(),
        player in mark(),
    ) {
        // given
        let store = GameStore::new(query());
        let tx = TransactionId::from_raw(1);
        let entity = EntityId::for_cell(target);
        store.begin(tx, entity, set_to(player)).unwrap();

        // when
        store.upsert(entity, ModelPayload::Cell(Cell { position: target, player }));
        store.confirm(tx).unwrap();

        // then
        prop_assert_eq!(store.view().cell(target), CellView::Authoritative(player));
        prop_assert_eq!(store.optimistic_len(), 0);
        prop_assert!(store.confirm(tx).is_err());
        prop_assert_eq!(store.view().cell(target), CellView::Authoritative(player));
    }

    #[test]
    fn upsert__stale_value_while_confirmed__leaves_view_unchanged(
        target in position(),
        player in mark(),
        repeats in 1usize..4,
    ) {
        // given
        let store = GameStore::new(query());
        let entity = EntityId::for_cell(target);
        let stale = ModelPayload::Cell(Cell::empty(target));
        store.upsert(entity, stale);
        let tx = TransactionId::from_raw(1);
        store.begin(tx, entity, set_to(player)).unwrap();
        store.confirm(tx).unwrap();
        let before = store.view();

        // when
        for _ in 0..repeats {
            store.upsert(entity, stale);
        }

        // then
        prop_assert_eq!(store.view(), before);
        prop_assert_eq!(store.optimistic_len(), 1);
    }

    #[test]
    fn merge__any_accepted_game_state__never_reports_two_winners(
        is_active in any::<bool>(),
        has_x_won in any::<bool>(),
        has_o_won in any::<bool>(),
        event_winner in player(),
        event_first in any::<bool>(),
    ) {
        // given
        let mut cache = EntityCache::new();
        let game = EntityId::for_game(0);
        let raw_state = json!({
            "game_id": 0,
            "is_active": is_active,
            "player_turn": "X",
            "has_x_won": has_x_won,
            "has_o_won": has_o_won,
        });
        let won = ModelPayload::GameWon(GameWon {
            player: event_winner,
            last_cell: Cell::empty(Position::new(0, 0).unwrap()),
        });
        let state = ModelPayload::decode(ModelName::GameState, raw_state);

        // when
        if event_first {
            cache.upsert(game, won);
        }
        if let Ok(state) = state {
            cache.upsert(game, state);
        }
        if !event_first {
            cache.upsert(game, won);
        }
        let view = merge(&query(), &cache, []);

        // then
        prop_assert!(!(view.has_x_won && view.has_o_won));
        if let Some(GameState { is_active: true, .. }) = cache.game_state(game) {
            prop_assert!(!view.is_won());
        }
    }
}
