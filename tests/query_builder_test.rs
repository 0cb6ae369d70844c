//! Black-box tests for the query builder against adversarial input.
//!
//! Random payloads are generated with `rand`; every built plan must keep
//! caller values out of the SQL text and in the parameter list.

use db_bridge_mcp::db::{Dialect, QueryBuilder, is_valid_identifier, is_valid_order_by};
use db_bridge_mcp::error::DbError;
use db_bridge_mcp::models::{ConditionMap, QueryParam};
use rand::Rng;
use rand::seq::SliceRandom;

const PAYLOADS: &[&str] = &[
    "'; DROP TABLE users; --",
    "' OR '1'='1",
    "1; DELETE FROM accounts",
    "\" OR \"\"=\"",
    "` OR 1=1 #",
    "$1; SELECT pg_sleep(10)",
    "?; SHUTDOWN",
    "admin'/*",
    "\\'; TRUNCATE orders; --",
    "1' UNION SELECT NULL, NULL--",
];

fn random_payload() -> String {
    let mut rng = rand::thread_rng();
    let base = PAYLOADS.choose(&mut rng).copied().unwrap_or(PAYLOADS[0]);
    let noise: String = (0..rng.gen_range(0..8))
        .map(|_| rng.gen_range(b'!'..=b'~') as char)
        .collect();
    format!("{}{}", base, noise)
}

fn conditions(pairs: &[(&str, QueryParam)]) -> ConditionMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[test]
fn payload_values_only_reach_params() {
    for dialect in [Dialect::MySql, Dialect::Postgres] {
        let builder = QueryBuilder::new(dialect);
        for _ in 0..200 {
            let payload = random_payload();
            let conds = conditions(&[
                ("name", QueryParam::from(payload.as_str())),
                ("status", QueryParam::from("active")),
            ]);

            let select = builder
                .build_select("users", &conds, 10, 0, "")
                .unwrap();
            let count = builder.build_count("users", &conds).unwrap();
            let agg = builder
                .build_aggregation("users", "age", "avg", &conds, "status")
                .unwrap();

            for plan in [&select, &count, &agg] {
                assert!(
                    !plan.sql.contains(payload.as_str()),
                    "payload leaked into {:?}",
                    plan.sql
                );
                assert!(plan.params.contains(&QueryParam::from(payload.as_str())));
            }
        }
    }
}

#[test]
fn mysql_placeholders_are_question_marks() {
    let conds = conditions(&[
        ("a", 1i64.into()),
        ("b", "x".into()),
        ("c", true.into()),
    ]);
    let plan = QueryBuilder::new(Dialect::MySql)
        .build_select("t", &conds, 0, 0, "")
        .unwrap();
    assert_eq!(plan.sql, "SELECT * FROM `t` WHERE `a` = ? AND `b` = ? AND `c` = ?");
    assert!(!plan.sql.contains('$'));
    assert_eq!(plan.params.len(), 3);
}

#[test]
fn postgres_placeholders_are_numbered_in_param_order() {
    let mut rng = rand::thread_rng();
    for _ in 0..20 {
        let n = rng.gen_range(1..12);
        let conds: ConditionMap = (0..n)
            .map(|i| (format!("col_{:02}", i), QueryParam::Int(i as i64)))
            .collect();
        let plan = QueryBuilder::new(Dialect::Postgres)
            .build_count("events", &conds)
            .unwrap();

        assert_eq!(plan.params.len(), n);
        for (i, param) in plan.params.iter().enumerate() {
            let clause = format!("\"col_{:02}\" = ${}", i, i + 1);
            assert!(plan.sql.contains(&clause), "missing {} in {}", clause, plan.sql);
            assert_eq!(param, &QueryParam::Int(i as i64));
        }
        assert!(!plan.sql.contains(&format!("${}", n + 1)));
    }
}

#[test]
fn identifiers_are_quoted_per_dialect() {
    let conds = conditions(&[("status", "paid".into())]);
    let mysql = QueryBuilder::new(Dialect::MySql)
        .build_select("shop.orders", &conds, 0, 0, "")
        .unwrap();
    assert_eq!(
        mysql.sql,
        "SELECT * FROM `shop`.`orders` WHERE `status` = ?"
    );

    let postgres = QueryBuilder::new(Dialect::Postgres)
        .build_select("shop.orders", &conds, 0, 0, "")
        .unwrap();
    assert_eq!(
        postgres.sql,
        "SELECT * FROM \"shop\".\"orders\" WHERE \"status\"::text = $1"
    );
}

#[test]
fn aggregate_allow_list() {
    let builder = QueryBuilder::new(Dialect::MySql);
    let err = builder
        .build_aggregation("orders", "total", "DROP TABLE", &ConditionMap::new(), "")
        .unwrap_err();
    assert!(matches!(err, DbError::InvalidAggregateFunction { .. }));

    let plan = builder
        .build_aggregation("orders", "total", "sum", &ConditionMap::new(), "")
        .unwrap();
    assert!(plan.sql.contains("SUM(`total`)"));
}

#[test]
fn like_only_for_wildcard_strings() {
    let conds = conditions(&[("name", "%phone%".into()), ("sku", "A100".into())]);
    let plan = QueryBuilder::new(Dialect::Postgres)
        .build_select("products", &conds, 0, 0, "")
        .unwrap();
    assert_eq!(
        plan.sql,
        "SELECT * FROM \"products\" WHERE \"name\"::text LIKE $1 AND \"sku\"::text = $2"
    );
}

#[test]
fn order_by_allow_list() {
    let builder = QueryBuilder::new(Dialect::MySql);
    let plan = builder
        .build_select("users", &ConditionMap::new(), 5, 0, "created_at DESC, id ASC")
        .unwrap();
    assert!(plan.sql.ends_with("ORDER BY created_at DESC, id ASC LIMIT 5"));

    let plan = builder
        .build_select("users", &ConditionMap::new(), 5, 10, "created_at; DROP TABLE users")
        .unwrap();
    assert_eq!(plan.sql, "SELECT * FROM `users` LIMIT 5 OFFSET 10");

    for _ in 0..100 {
        let payload = random_payload();
        assert!(!is_valid_order_by(&payload), "accepted {:?}", payload);
    }
}

#[test]
fn pagination_clauses() {
    let builder = QueryBuilder::new(Dialect::MySql);
    let plan = builder
        .build_select("users", &ConditionMap::new(), 10, 0, "")
        .unwrap();
    assert!(plan.sql.ends_with(" LIMIT 10"));
    assert!(!plan.sql.contains("OFFSET"));

    let plan = builder
        .build_select("users", &ConditionMap::new(), 25, 10, "")
        .unwrap();
    assert!(plan.sql.ends_with(" LIMIT 25 OFFSET 10"));
}

#[test]
fn identifier_rules() {
    assert!(!is_valid_identifier("users; DROP TABLE x"));
    assert!(is_valid_identifier("schema.table_1"));
    assert!(!is_valid_identifier(""));

    for _ in 0..100 {
        let payload = random_payload();
        assert!(!is_valid_identifier(&payload));
    }
}

#[test]
fn invalid_names_fail_before_any_sql() {
    let builder = QueryBuilder::new(Dialect::Postgres);
    for _ in 0..50 {
        let payload = random_payload();
        assert!(matches!(
            builder.build_select(&payload, &ConditionMap::new(), 0, 0, ""),
            Err(DbError::InvalidIdentifier { .. })
        ));

        let conds = conditions(&[(payload.as_str(), "x".into())]);
        assert!(matches!(
            builder.build_count("users", &conds),
            Err(DbError::InvalidIdentifier { .. })
        ));

        assert!(matches!(
            builder.build_aggregation("users", &payload, "MAX", &ConditionMap::new(), ""),
            Err(DbError::InvalidIdentifier { .. })
        ));
    }
}

#[test]
fn end_to_end_mysql_select() {
    let plan = QueryBuilder::new(Dialect::MySql)
        .build_select(
            "users",
            &conditions(&[("status", "active".into())]),
            10,
            0,
            "created_at DESC",
        )
        .unwrap();
    assert_eq!(
        plan.sql,
        "SELECT * FROM `users` WHERE `status` = ? ORDER BY created_at DESC LIMIT 10"
    );
    assert_eq!(plan.params, vec![QueryParam::from("active")]);
}

#[test]
fn unknown_driver_falls_back_to_mysql() {
    let plan = QueryBuilder::for_driver("oracle")
        .build_count("users", &conditions(&[("id", 1i64.into())]))
        .unwrap();
    assert_eq!(plan.sql, "SELECT COUNT(*) FROM `users` WHERE `id` = ?");
}
