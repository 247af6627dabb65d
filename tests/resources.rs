#![allow(missing_docs)]
mod common;

use closeable_rows::{
    ArgSetter, DataAccessError, IterableTemplate, ResourceSet, ResourceTracker, SingleColumn,
    SqlStatementCreator, StatementSettings, TemplateBuilder, Value,
};
use common::{Event, Fail, SpyCreator, SpySetter, SpySource};
use std::{sync::Arc, time::Duration};

const SQL: &str = "select n from t where n > ?";

fn spy_template(source: SpySource) -> IterableTemplate<SpySource> {
    TemplateBuilder::new().set_track_resources(true).build(source)
}

#[test]
fn release_runs_in_reverse_acquisition_order() {
    let source = SpySource::numbers(2);
    let log = source.log();
    let template = spy_template(source);

    let creator = SpyCreator { sql: SQL.to_owned(), log: Arc::clone(&log) };
    let setter = SpySetter { args: vec![Value::Integer(-1)], log: Arc::clone(&log) };
    let iter = template
        .query_for_iter_with(creator, Some(setter), SingleColumn::<i64>::new())
        .unwrap();
    let values: Vec<i64> = iter.map(Result::unwrap).collect();
    assert_eq!(values, vec![0, 1]);

    assert_eq!(
        template.source().events(),
        vec![
            Event::Acquire(1),
            Event::Prepare(SQL.to_owned()),
            Event::Settings(StatementSettings::default()),
            Event::Bind(1, Value::Integer(-1)),
            Event::Execute(Some(SQL.to_owned())),
            Event::CursorClose,
            Event::DisposeSetter,
            Event::DisposeCreator,
            Event::StmtClose,
            Event::Release(1),
        ]
    );
    assert_eq!(template.source().open_connections(), 0);
    assert_eq!(template.tracker().unwrap().open_count(), 0);
}

#[test]
fn release_is_idempotent() {
    let source = Arc::new(SpySource::numbers(1));
    let mut set = ResourceSet::acquire(Arc::clone(&source), Some(SQL), None).unwrap();
    set.register_creator(SqlStatementCreator::new(SQL));
    set.register_setter(ArgSetter::new(vec![Value::Integer(0)]));
    set.open_prepared(&StatementSettings::default()).unwrap();

    set.release();
    let after_first = source.events();
    set.release();
    set.release();
    drop(set);

    assert_eq!(source.events(), after_first);
    assert_eq!(after_first.iter().filter(|e| matches!(e, Event::Release(_))).count(), 1);
    assert_eq!(source.open_connections(), 0);
}

#[test]
fn release_continues_past_failures() {
    let source = Arc::new(
        SpySource::numbers(1)
            .failing(Fail::CursorClose)
            .failing(Fail::StmtClose)
            .failing(Fail::Release),
    );
    let mut set = ResourceSet::acquire(Arc::clone(&source), Some(SQL), None).unwrap();
    set.register_creator(SqlStatementCreator::new(SQL));
    set.open_prepared(&StatementSettings::default()).unwrap();

    set.release();
    assert!(set.is_released());

    let events = source.events();
    let closes: Vec<_> = events
        .iter()
        .filter(|e| matches!(e, Event::CursorClose | Event::StmtClose | Event::Release(_)))
        .collect();
    assert_eq!(closes, vec![&Event::CursorClose, &Event::StmtClose, &Event::Release(1)]);
    assert_eq!(source.open_connections(), 0);
}

#[test]
fn acquire_failure_leaves_nothing_open() {
    let template = spy_template(SpySource::numbers(3).failing(Fail::Acquire));
    let err = template.query_for_iter_single::<i64>(SQL, &[Value::Integer(0)]).unwrap_err();

    assert!(matches!(err, DataAccessError::Acquisition { task: "PreparedStatementCallback", .. }));
    assert!(template.source().events().is_empty());
    assert_eq!(template.tracker().unwrap().open_count(), 0);
}

#[test]
fn prepare_failure_releases_connection() {
    let template = spy_template(SpySource::numbers(3).failing(Fail::Prepare));
    let err = template.query_for_iter_single::<i64>(SQL, &[Value::Integer(0)]).unwrap_err();

    match err {
        DataAccessError::Acquisition { sql, .. } => assert_eq!(sql.as_deref(), Some(SQL)),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(template.source().events(), vec![Event::Acquire(1), Event::Release(1)]);
    assert_eq!(template.source().open_connections(), 0);
    assert_eq!(template.tracker().unwrap().open_count(), 0);
}

#[test]
fn bind_failure_releases_statement_and_connection() {
    let template = spy_template(SpySource::numbers(3).failing(Fail::Bind));
    let err = template.query_for_iter_single::<i64>(SQL, &[Value::Integer(0)]).unwrap_err();

    assert!(err.to_string().contains("injected bind failure"), "{err}");
    assert_eq!(
        template.source().events(),
        vec![
            Event::Acquire(1),
            Event::Prepare(SQL.to_owned()),
            Event::Settings(StatementSettings::default()),
            Event::StmtClose,
            Event::Release(1),
        ]
    );
    assert_eq!(template.source().open_connections(), 0);
}

#[test]
fn execute_failure_on_plain_statement() {
    let template = spy_template(SpySource::numbers(3).failing(Fail::Execute));
    let err = template.query_for_iter_single::<i64>("select n from t", &[]).unwrap_err();

    assert!(matches!(err, DataAccessError::Acquisition { task: "StatementCallback", .. }));
    assert_eq!(
        template.source().events(),
        vec![
            Event::Acquire(1),
            Event::CreatePlain,
            Event::Settings(StatementSettings::default()),
            Event::StmtClose,
            Event::Release(1),
        ]
    );
    assert_eq!(template.source().open_connections(), 0);
}

#[test]
fn blank_sql_is_rejected_before_acquiring() {
    let template = spy_template(SpySource::numbers(1));
    for sql in ["", "   ", "\n\t"] {
        let err = template.query_for_iter_single::<i64>(sql, &[]).unwrap_err();
        assert!(matches!(err, DataAccessError::BlankSql));
        let err = template.query_for_iter_single::<i64>(sql, &[Value::Null]).unwrap_err();
        assert!(matches!(err, DataAccessError::BlankSql));
    }
    assert!(template.source().events().is_empty());
}

#[test]
fn settings_reach_the_statement() {
    let template = TemplateBuilder::new()
        .set_fetch_size(50)
        .set_max_rows(10)
        .set_query_timeout(Duration::from_secs(3))
        .build(SpySource::numbers(1));
    let iter = template.query_for_iter_single::<i64>("select n from t", &[]).unwrap();
    assert_eq!(iter.count(), 1);

    let expected = StatementSettings {
        fetch_size: Some(50),
        max_rows: Some(10),
        query_timeout: Some(Duration::from_secs(3)),
    };
    assert!(template.source().events().contains(&Event::Settings(expected)));
}

#[test]
fn tracker_lists_unreleased_sets() {
    let tracker = ResourceTracker::new();
    let source = Arc::new(SpySource::numbers(1));

    let mut first = ResourceSet::acquire(Arc::clone(&source), Some("select 1"), Some(tracker.clone()))
        .unwrap();
    let second = ResourceSet::acquire(Arc::clone(&source), None, Some(tracker.clone())).unwrap();

    let open = tracker.open_sets();
    assert_eq!(open.len(), 2);
    assert_eq!(open[0].id, first.id());
    assert_eq!(open[0].sql.as_deref(), Some("select 1"));
    assert_eq!(open[1].sql, None);

    first.release();
    assert_eq!(tracker.open_count(), 1);
    assert_eq!(tracker.report_unreleased(), 1);

    drop(second);
    assert_eq!(tracker.open_count(), 0);
    assert_eq!(source.open_connections(), 0);
}
