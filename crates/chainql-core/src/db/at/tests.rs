use crate::{
    db::{
        at::{
            AtEntity, AtExecutor, AtExpr, AtExprId, AtWhatField, Cardinality, ComplexWhat,
            CompiledAt, ExtrasValues, SortDirection,
        },
        expr::{BinaryOp, DbExpr},
        sql::{SqlExecutor, SqlRow, SqlValue},
    },
    error::{ErrorClass, InternalError},
    interp::{ConstantExpr, FnExpr, Frame, FrameBlock, VarSlot},
    obs::{self, MetricsEvent, MetricsSink},
    test_fixtures::{Fixture, at},
    value::{Value, ValueType},
};
use std::{cell::RefCell, rc::Rc};

fn sql_of(fx: &Fixture, expr: &AtExpr, extras: ExtrasValues) -> (String, Vec<Value>) {
    let compiled = expr.compile(&fx.sql_ctx).expect("compile");
    let sql = compiled
        .build_sql(&mut Frame::new(), &extras)
        .expect("render");

    (sql.sql().to_string(), sql.params().to_vec())
}

fn attr(at_entity: &AtEntity, name: &str) -> DbExpr {
    DbExpr::attr(DbExpr::entity(at_entity.clone()), name)
}

// ----------------------------------------------------------------------
// Compilation
// ----------------------------------------------------------------------

#[test]
fn relation_filter_joins_once_and_orders_by_row_id() {
    let fx = Fixture::new();
    let (expr, user) = fx.users(1);
    let expr = expr.filter(DbExpr::equals(fx.company_attr(&user, "name"), DbExpr::constant("A")));

    let compiled = expr.compile(&fx.sql_ctx).expect("compile");
    assert_eq!(compiled.join_count(), 1);
    assert_eq!(compiled.alias_count(), 2);
    assert_eq!(compiled.label(), "user");

    let (sql, params) = sql_of(&fx, &expr, ExtrasValues::default());
    assert_eq!(
        sql,
        concat!(
            r#"SELECT A00."rowid" FROM "c0.user" A00"#,
            r#" INNER JOIN "c0.company" A01 ON A01."rowid" = A00."company""#,
            r#" WHERE (A01."name" = ?) ORDER BY A00."rowid" ASC"#,
        )
    );
    assert_eq!(params, [Value::text("A")]);
}

#[test]
fn repeated_paths_share_one_join() {
    let fx = Fixture::new();
    let (expr, user) = fx.users(1);
    let expr = expr
        .filter(DbExpr::and(
            DbExpr::equals(fx.company_attr(&user, "name"), DbExpr::constant("A")),
            DbExpr::equals(fx.company_attr(&user, "city"), DbExpr::constant("B")),
        ))
        .field(AtWhatField::db(fx.company_attr(&user, "city"), ValueType::Text));

    let compiled = expr.compile(&fx.sql_ctx).expect("compile");

    assert_eq!(compiled.join_count(), 1);
    assert_eq!(compiled.alias_count(), 2);
}

#[test]
fn external_entities_are_pinned_to_the_link_height() {
    let fx = Fixture::new();
    let (expr, _) = at(&fx.payment, 1, Cardinality::ZeroMany);

    let (sql, params) = sql_of(&fx, &expr, ExtrasValues::default());

    assert_eq!(
        sql,
        concat!(
            r#"SELECT A00."rowid" FROM "c3.payment" A00"#,
            r#" INNER JOIN "c3.transactions" A01 ON A01."tx_iid" = A00."transaction""#,
            r#" INNER JOIN "c3.blocks" A02 ON A02."block_iid" = A01."block_iid""#,
            r#" WHERE (A02."block_height" <= ?) ORDER BY A00."rowid" ASC"#,
        )
    );
    assert_eq!(params, [Value::Int(100)]);
}

#[test]
fn visibility_filter_is_anded_after_the_condition() {
    let fx = Fixture::new();
    let (expr, payment) = at(&fx.payment, 1, Cardinality::ZeroMany);
    let expr = expr.filter(DbExpr::binary(
        BinaryOp::Gt,
        attr(&payment, "amount"),
        DbExpr::constant(5_i64),
    ));

    let (sql, params) = sql_of(&fx, &expr, ExtrasValues::default());

    assert!(sql.contains(r#" WHERE ((A00."amount" > ?) AND (A02."block_height" <= ?))"#));
    assert_eq!(params, [Value::Int(5), Value::Int(100)]);
}

#[test]
fn limit_and_offset_clauses_depend_only_on_the_compiled_shape() {
    let fx = Fixture::new();
    let (expr, _) = fx.users(1);
    let expr = expr
        .limit(ConstantExpr::shared(5_i64))
        .offset(ConstantExpr::shared(2_i64));

    let (sql, params) = sql_of(
        &fx,
        &expr,
        ExtrasValues {
            limit: Some(5),
            offset: Some(2),
        },
    );
    assert!(sql.ends_with(r#"ORDER BY A00."rowid" ASC LIMIT ? OFFSET ?"#));
    assert_eq!(params, [Value::Int(5), Value::Int(2)]);

    // same text when the offset was skipped
    let (same, params) = sql_of(
        &fx,
        &expr,
        ExtrasValues {
            limit: Some(5),
            offset: None,
        },
    );
    assert_eq!(same, sql);
    assert_eq!(params, [Value::Int(5), Value::Int(0)]);
}

#[test]
fn offset_without_limit_binds_an_unbounded_limit() {
    let fx = Fixture::new();
    let (expr, _) = fx.users(1);
    let expr = expr.offset(ConstantExpr::shared(3_i64));

    let (sql, params) = sql_of(
        &fx,
        &expr,
        ExtrasValues {
            limit: None,
            offset: Some(3),
        },
    );

    assert!(sql.ends_with("LIMIT ? OFFSET ?"));
    assert_eq!(params, [Value::Int(i64::MAX), Value::Int(3)]);
}

#[test]
fn sorted_and_omitted_fields() {
    let fx = Fixture::new();
    let (expr, user) = fx.users(1);
    let expr = expr
        .field(
            AtWhatField::db(attr(&user, "name"), ValueType::Text)
                .named("name")
                .sort(SortDirection::Desc),
        )
        .field(
            AtWhatField::db(attr(&user, "score"), ValueType::Integer)
                .sort(SortDirection::Asc)
                .omit(),
        );

    let compiled = expr.compile(&fx.sql_ctx).expect("compile");
    assert_eq!(compiled.column_count(), 2);

    let (sql, _) = sql_of(&fx, &expr, ExtrasValues::default());
    assert_eq!(
        sql,
        concat!(
            r#"SELECT A00."name", A00."score" FROM "c0.user" A00"#,
            r#" ORDER BY A00."name" DESC, A00."score" ASC"#,
        )
    );
}

#[test]
fn several_from_entities_are_cross_joined() {
    let fx = Fixture::new();
    let user = AtEntity::new(fx.user.clone(), AtExprId(1), 0);
    let company = AtEntity::new(fx.company.clone(), AtExprId(1), 1);
    let expr = AtExpr::new(
        AtExprId(1),
        vec![user.clone(), company.clone()],
        Cardinality::ZeroMany,
    )
    .filter(DbExpr::equals(
        DbExpr::rel(DbExpr::entity(user), "company", fx.company.clone()),
        DbExpr::entity(company),
    ));

    let (sql, _) = sql_of(&fx, &expr, ExtrasValues::default());

    assert_eq!(
        sql,
        concat!(
            r#"SELECT A00."rowid", A01."rowid" FROM "c0.user" A00, "c0.company" A01"#,
            r#" WHERE (A00."company" = A01."rowid")"#,
            r#" ORDER BY A00."rowid" ASC, A01."rowid" ASC"#,
        )
    );
}

#[test]
fn empty_from_is_rejected() {
    let fx = Fixture::new();
    let expr = AtExpr::new(AtExprId(1), vec![], Cardinality::ZeroMany);

    assert!(expr.compile(&fx.sql_ctx).unwrap_err().is_invariant_violation());
}

#[test]
fn constant_true_condition_drops_the_where_clause() {
    let fx = Fixture::new();
    let (expr, _) = fx.users(1);
    let expr = expr.filter(DbExpr::constant(true));

    let (sql, params) = sql_of(&fx, &expr, ExtrasValues::default());

    assert_eq!(sql, r#"SELECT A00."rowid" FROM "c0.user" A00 ORDER BY A00."rowid" ASC"#);
    assert!(params.is_empty());
}

// ----------------------------------------------------------------------
// Sub-queries
// ----------------------------------------------------------------------

#[test]
fn exists_sub_query_references_the_outer_entity() {
    let fx = Fixture::new();
    let (outer, company) = at(&fx.company, 1, Cardinality::ZeroMany);
    let (inner, user) = fx.users(2);
    let inner = inner.filter(DbExpr::equals(
        DbExpr::rel(DbExpr::entity(user), "company", fx.company.clone()),
        DbExpr::entity(company),
    ));
    let expr = outer.filter(DbExpr::exists(inner, false));

    let compiled = expr.compile(&fx.sql_ctx).expect("compile");
    assert_eq!(compiled.alias_count(), 2);

    let (sql, _) = sql_of(&fx, &expr, ExtrasValues::default());
    assert_eq!(
        sql,
        concat!(
            r#"SELECT A00."rowid" FROM "c0.company" A00"#,
            r#" WHERE EXISTS (SELECT A01."rowid" FROM "c0.user" A01"#,
            r#" WHERE (A01."company" = A00."rowid"))"#,
            r#" ORDER BY A00."rowid" ASC"#,
        )
    );
}

#[test]
fn in_sub_query_selects_one_column() {
    let fx = Fixture::new();
    let (outer, user) = fx.users(1);
    let (inner, company) = at(&fx.company, 2, Cardinality::ZeroMany);
    let inner = inner.filter(DbExpr::equals(attr(&company, "city"), DbExpr::constant("X")));
    let expr = outer.filter(DbExpr::in_at(
        DbExpr::rel(DbExpr::entity(user), "company", fx.company.clone()),
        inner,
        true,
    ));

    let (sql, params) = sql_of(&fx, &expr, ExtrasValues::default());

    assert!(sql.contains(concat!(
        r#"WHERE (A00."company" NOT IN (SELECT A01."rowid" FROM "c0.company" A01"#,
        r#" WHERE (A01."city" = ?)))"#,
    )));
    assert_eq!(params, [Value::text("X")]);
}

#[test]
fn nested_scalar_with_limit_gets_a_deterministic_order() {
    let fx = Fixture::new();
    let (outer, company) = at(&fx.company, 1, Cardinality::ZeroMany);
    let (inner, user) = fx.users(2);
    let inner = inner
        .filter(DbExpr::equals(
            DbExpr::rel(DbExpr::entity(user.clone()), "company", fx.company.clone()),
            DbExpr::entity(company),
        ))
        .field(AtWhatField::db(attr(&user, "name"), ValueType::Text))
        .limit(ConstantExpr::shared(1_i64));
    let expr = outer.field(AtWhatField::db(DbExpr::nested(inner), ValueType::Text));

    let (sql, params) = sql_of(&fx, &expr, ExtrasValues::default());

    assert_eq!(
        sql,
        concat!(
            r#"SELECT (SELECT A01."name" FROM "c0.user" A01"#,
            r#" WHERE (A01."company" = A00."rowid") ORDER BY A01."rowid" ASC LIMIT ?)"#,
            r#" FROM "c0.company" A00 ORDER BY A00."rowid" ASC"#,
        )
    );
    assert_eq!(params, [Value::Int(1)]);
}

#[test]
fn multi_column_sub_query_is_rejected() {
    let fx = Fixture::new();
    let (outer, _) = at(&fx.company, 1, Cardinality::ZeroMany);
    let (inner, user) = fx.users(2);
    let inner = inner
        .field(AtWhatField::db(attr(&user, "name"), ValueType::Text))
        .field(AtWhatField::db(attr(&user, "score"), ValueType::Integer));
    let expr = outer.field(AtWhatField::db(DbExpr::nested(inner), ValueType::Text));

    assert!(expr.compile(&fx.sql_ctx).unwrap_err().is_invariant_violation());
}

// ----------------------------------------------------------------------
// Complex projections
// ----------------------------------------------------------------------

fn complex_name_and_score(user: &AtEntity, block: FrameBlock) -> AtWhatField {
    let (name, score) = (block.slot(0), block.slot(1));

    AtWhatField::complex(ComplexWhat {
        columns: vec![
            (attr(user, "name"), ValueType::Text, name),
            (attr(user, "score"), ValueType::Integer, score),
        ],
        expr: FnExpr::shared("label", move |frame| {
            let name = frame.get(name)?.clone();
            let score = frame.get(score)?.clone();
            Ok(Value::Text(format!("{name}:{score}")))
        }),
    })
}

#[test]
fn complex_slots_must_lie_in_the_block() {
    let fx = Fixture::new();
    let (expr, user) = fx.users(1);
    let expr = expr
        .with_block(FrameBlock::new(0, 1))
        .field(complex_name_and_score(&user, FrameBlock::new(0, 2)));

    assert!(expr.compile(&fx.sql_ctx).unwrap_err().is_invariant_violation());
}

#[test]
fn complex_fields_cannot_be_sorted() {
    let fx = Fixture::new();
    let (expr, user) = fx.users(1);
    let block = FrameBlock::new(0, 2);
    let expr = expr
        .with_block(block)
        .field(complex_name_and_score(&user, block).sort(SortDirection::Asc));

    assert!(expr.compile(&fx.sql_ctx).is_err());
}

// ----------------------------------------------------------------------
// Execution
// ----------------------------------------------------------------------

///
/// ScriptedExecutor
/// Returns fixed rows and records every statement it is asked to run.
///

#[derive(Default)]
struct ScriptedExecutor {
    rows: Vec<Vec<SqlValue>>,
    statements: RefCell<Vec<String>>,
}

struct ScriptedRow<'a>(&'a [SqlValue]);

impl SqlRow for ScriptedRow<'_> {
    fn column_count(&self) -> usize {
        self.0.len()
    }

    fn value(&self, index: usize) -> Result<SqlValue, InternalError> {
        self.0
            .get(index)
            .cloned()
            .ok_or_else(|| InternalError::executor_invariant("column out of range"))
    }
}

impl SqlExecutor for ScriptedExecutor {
    fn execute(&self, sql: &str, _: &[Value]) -> Result<u64, InternalError> {
        self.statements.borrow_mut().push(sql.to_string());
        Ok(0)
    }

    fn query(
        &self,
        sql: &str,
        _: &[Value],
        on_row: &mut dyn FnMut(&dyn SqlRow) -> Result<(), InternalError>,
    ) -> Result<(), InternalError> {
        self.statements.borrow_mut().push(sql.to_string());
        for row in &self.rows {
            on_row(&ScriptedRow(row))?;
        }
        Ok(())
    }
}

fn scripted(rows: Vec<Vec<SqlValue>>) -> ScriptedExecutor {
    ScriptedExecutor {
        rows,
        ..ScriptedExecutor::default()
    }
}

fn compile(fx: &Fixture, expr: &AtExpr) -> CompiledAt {
    expr.compile(&fx.sql_ctx).expect("compile")
}

#[test]
fn result_shape_follows_cardinality() {
    let fx = Fixture::new();
    let exec = scripted(vec![vec![SqlValue::Integer(7)]]);
    let executor = AtExecutor::new(&exec);

    let (many, _) = fx.users(1);
    let value = executor
        .evaluate(&mut Frame::new(), &compile(&fx, &many))
        .expect("many");
    assert_eq!(value, Value::List(vec![Value::entity("user", 7)]));

    let (one, _) = at(&fx.user, 1, Cardinality::One);
    let value = executor
        .evaluate(&mut Frame::new(), &compile(&fx, &one))
        .expect("one");
    assert_eq!(value, Value::entity("user", 7));
}

#[test]
fn optional_single_result_is_null_when_empty() {
    let fx = Fixture::new();
    let exec = scripted(vec![]);
    let (expr, _) = at(&fx.user, 1, Cardinality::ZeroOne);

    let value = AtExecutor::new(&exec)
        .evaluate(&mut Frame::new(), &compile(&fx, &expr))
        .expect("evaluate");

    assert_eq!(value, Value::Null);
}

#[test]
fn wrong_row_count_is_reported_with_the_count() {
    let fx = Fixture::new();
    let (expr, _) = at(&fx.user, 1, Cardinality::One);
    let compiled = compile(&fx, &expr);

    let none = scripted(vec![]);
    let err = AtExecutor::new(&none)
        .evaluate(&mut Frame::new(), &compiled)
        .unwrap_err();
    assert_eq!(err.code(), "at:wrong_count:0");
    assert_eq!(err.message, "no records found");
    assert_eq!(err.class, ErrorClass::NotFound);

    let two = scripted(vec![vec![SqlValue::Integer(1)], vec![SqlValue::Integer(2)]]);
    let err = AtExecutor::new(&two)
        .evaluate(&mut Frame::new(), &compiled)
        .unwrap_err();
    assert_eq!(err.code(), "at:wrong_count:2");
    assert_eq!(err.message, "multiple records found: 2");

    let (expr, _) = at(&fx.user, 1, Cardinality::OneMany);
    let err = AtExecutor::new(&none)
        .evaluate(&mut Frame::new(), &compile(&fx, &expr))
        .unwrap_err();
    assert_eq!(err.code(), "at:wrong_count:0");
}

#[test]
fn zero_limit_never_reaches_the_database() {
    let fx = Fixture::new();
    let exec = scripted(vec![vec![SqlValue::Integer(1)]]);

    let (expr, _) = fx.users(1);
    let expr = expr.limit(ConstantExpr::shared(0_i64));
    let value = AtExecutor::new(&exec)
        .evaluate(&mut Frame::new(), &compile(&fx, &expr))
        .expect("evaluate");
    assert_eq!(value, Value::List(vec![]));

    let (expr, _) = at(&fx.user, 1, Cardinality::One);
    let expr = expr.limit(ConstantExpr::shared(0_i64));
    let err = AtExecutor::new(&exec)
        .evaluate(&mut Frame::new(), &compile(&fx, &expr))
        .unwrap_err();
    assert_eq!(err.code(), "at:wrong_count:0");

    assert!(exec.statements.borrow().is_empty());
}

#[test]
fn negative_extras_fail_before_any_statement() {
    let fx = Fixture::new();
    let exec = scripted(vec![]);
    let (expr, _) = fx.users(1);
    let expr = expr
        .limit(ConstantExpr::shared(3_i64))
        .offset(ConstantExpr::shared(-2_i64));

    let err = AtExecutor::new(&exec)
        .evaluate(&mut Frame::new(), &compile(&fx, &expr))
        .unwrap_err();

    assert_eq!(err.code(), "at:offset:negative:-2");
    assert!(exec.statements.borrow().is_empty());
}

#[test]
fn complex_fields_are_combined_per_row() {
    let fx = Fixture::new();
    let (expr, user) = fx.users(1);
    let block = FrameBlock::new(4, 2);
    let expr = expr
        .with_block(block)
        .field(complex_name_and_score(&user, block).named("label"))
        .field(AtWhatField::db(attr(&user, "score"), ValueType::Integer).named("score"));

    let exec = scripted(vec![vec![
        SqlValue::Text("ann".into()),
        SqlValue::Integer(3),
        SqlValue::Integer(3),
    ]]);
    let mut frame = Frame::new();

    let value = AtExecutor::new(&exec)
        .evaluate(&mut frame, &compile(&fx, &expr))
        .expect("evaluate");

    let Value::List(rows) = value else {
        panic!("expected a list");
    };
    let Value::Tuple(fields) = &rows[0] else {
        panic!("expected a tuple");
    };
    assert_eq!(fields[0].name.as_deref(), Some("label"));
    assert_eq!(fields[0].value, Value::text("\"ann\":3"));
    assert_eq!(fields[1].value, Value::Int(3));
    assert_eq!(frame.depth(), 0);
}

#[test]
fn block_slots_are_cleared_after_evaluation() {
    let fx = Fixture::new();
    let (expr, user) = fx.users(1);
    let block = FrameBlock::new(0, 2);
    let expr = expr
        .with_block(block)
        .field(complex_name_and_score(&user, block));
    let exec = scripted(vec![vec![SqlValue::Text("x".into()), SqlValue::Integer(1)]]);

    let mut frame = Frame::new();
    AtExecutor::new(&exec)
        .evaluate(&mut frame, &compile(&fx, &expr))
        .expect("evaluate");

    assert!(frame.get(VarSlot(0)).is_err());
    assert!(frame.get(VarSlot(1)).is_err());
}

#[test]
fn execution_emits_metrics_events() {
    #[derive(Default)]
    struct Recorder(RefCell<Vec<String>>);

    impl MetricsSink for Recorder {
        fn record(&self, event: MetricsEvent<'_>) {
            self.0.borrow_mut().push(format!("{event:?}"));
        }
    }

    let fx = Fixture::new();
    let (expr, _) = fx.users(1);
    let compiled = compile(&fx, &expr);
    let exec = scripted(vec![vec![SqlValue::Integer(1)], vec![SqlValue::Integer(2)]]);
    let recorder = Rc::new(Recorder::default());

    obs::with_metrics_sink(recorder.clone(), || {
        AtExecutor::new(&exec)
            .evaluate(&mut Frame::new(), &compiled)
            .expect("evaluate");
    });

    assert_eq!(
        *recorder.0.borrow(),
        [
            "AtExecStart { entity: \"user\" }",
            "SqlStatement { params: 0 }",
            "AtExecFinish { entity: \"user\", rows: 2 }",
        ]
    );
}

#[test]
fn cardinality_violation_is_counted() {
    let fx = Fixture::new();
    let (expr, _) = at(&fx.user, 1, Cardinality::One);
    let compiled = compile(&fx, &expr);
    let exec = scripted(vec![]);

    obs::metrics_reset_all();
    let _ = AtExecutor::new(&exec).evaluate(&mut Frame::new(), &compiled);

    let report = obs::metrics_report();
    let counters = report.counters.as_ref().expect("counters");
    assert_eq!(counters.ops.cardinality_violations, 1);
    assert_eq!(counters.ops.at_calls, 1);
    assert_eq!(report.entity_counters[0].entity, "user");
    assert_eq!(report.entity_counters[0].cardinality_violations, 1);
}
