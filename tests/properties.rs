use chrono::{TimeZone, Utc};
use import_reconcile::{
    detect_fuzzy_duplicates, export_csv_string, similarity, CsvParser, DedupOptions,
    ImportParser, Transaction, TransactionRecord,
};
use proptest::prelude::*;

fn record() -> impl Strategy<Value = TransactionRecord> {
    (
        "[a-c][0-9]",
        -500.0f64..500.0,
        0i64..(10 * 86_400_000),
        proptest::option::of("[a-d ]{0,8}"),
    )
        .prop_map(|(id, amount, date, description)| TransactionRecord {
            id,
            amount,
            date,
            description,
        })
}

fn records() -> impl Strategy<Value = Vec<TransactionRecord>> {
    proptest::collection::vec(record(), 0..8)
}

fn transaction() -> impl Strategy<Value = Transaction> {
    (
        " ?[a-z0-9]{1,12} ?",
        " ?(income|expense)",
        -1.0e7f64..1.0e7,
        "[A-Za-z ,\"]{0,12}",
        "[A-Za-z ]{0,10}",
        0i64..4_102_444_800_000,
        proptest::option::of("[A-Za-z0-9 ,\"\n]{0,30}"),
        proptest::collection::vec("[a-z]{1,8}", 0..4),
    )
        .prop_map(
            |(id, kind, amount, category, payment_method, millis, description, tags)| Transaction {
                id,
                kind,
                amount,
                category,
                payment_method,
                date: Utc.timestamp_millis_opt(millis).unwrap(),
                description,
                tags,
            },
        )
}

proptest! {
    #[test]
    fn similarity_is_symmetric(a in ".{0,40}", b in ".{0,40}") {
        prop_assert_eq!(similarity(&a, &b), similarity(&b, &a));
    }

    #[test]
    fn similarity_is_bounded(a in ".{0,40}", b in ".{0,40}") {
        let score = similarity(&a, &b);
        prop_assert!((0.0..=1.0).contains(&score), "score {} out of range", score);
    }

    #[test]
    fn similarity_identity(a in ".{0,40}") {
        prop_assert_eq!(similarity(&a, &a), 1.0);
    }

    #[test]
    fn exact_id_takes_precedence(existing in record(), incoming in record()) {
        let incoming = TransactionRecord { id: existing.id.clone(), ..incoming };

        let flagged = detect_fuzzy_duplicates(&[existing], &[incoming.clone()], None);

        prop_assert_eq!(flagged.get(&incoming.id).map(String::as_str), Some("Exact ID match"));
    }

    #[test]
    fn raising_threshold_never_flags_more(
        existing in records(),
        incoming in records(),
        low in 0.0f64..1.0,
        delta in 0.0f64..0.5,
    ) {
        let high = low + delta;
        let at_low = detect_fuzzy_duplicates(
            &existing,
            &incoming,
            Some(DedupOptions::default().with_threshold(low)),
        );
        let at_high = detect_fuzzy_duplicates(
            &existing,
            &incoming,
            Some(DedupOptions::default().with_threshold(high)),
        );

        for id in at_high.keys() {
            prop_assert!(at_low.contains_key(id), "{} flagged at {} but not at {}", id, high, low);
        }
    }

    #[test]
    fn detection_is_pure(existing in records(), incoming in records()) {
        let existing_before = existing.clone();
        let incoming_before = incoming.clone();

        let first = detect_fuzzy_duplicates(&existing, &incoming, None);
        let second = detect_fuzzy_duplicates(&existing, &incoming, None);

        prop_assert_eq!(first, second);
        prop_assert_eq!(existing, existing_before);
        prop_assert_eq!(incoming, incoming_before);
    }

    #[test]
    fn csv_round_trip_preserves_fields(original in proptest::collection::vec(transaction(), 1..6)) {
        let csv = export_csv_string(&original).unwrap();
        let parsed = CsvParser::new().parse_str(&csv).unwrap();

        prop_assert_eq!(parsed.len(), original.len());
        for (p, o) in parsed.iter().zip(&original) {
            prop_assert_eq!(&p.id, &o.id);
            prop_assert_eq!(&p.kind, &o.kind);
            prop_assert!((p.amount - o.amount).abs() < 1e-9);
            prop_assert_eq!(&p.category, &o.category);
            prop_assert_eq!(&p.payment_method, &o.payment_method);
            prop_assert_eq!(p.date, o.date);
            // An empty description reads back as absent
            let expected = o.description.clone().filter(|d| !d.is_empty());
            prop_assert_eq!(&p.description, &expected);
            prop_assert_eq!(&p.tags, &o.tags);
        }
    }
}
