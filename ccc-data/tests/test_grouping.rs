use std::collections::HashSet;
use std::sync::Arc;

use ccc_data::{
    CccDataError, ComplexType, DataId, DataSet, Datum, DimensionType, EnsureOptions, FlattenMode,
    GroupingOptions, GroupingSpec, LoadOptions, QueryClause, QuerySpec, Record, ValueType,
    WhereOptions,
};
use rstest::rstest;

fn chart_type() -> Result<ComplexType, CccDataError> {
    ComplexType::new()
        .with_dimension(DimensionType::new("series", ValueType::String))?
        .with_dimension(DimensionType::new("category", ValueType::String))?
        .with_dimension(DimensionType::new("value", ValueType::Number))
}

fn null_when_value_missing() -> LoadOptions {
    LoadOptions::default().with_is_null(Arc::new(|d: &Datum| d.value("value").is_none()))
}

fn record(series: &str, category: &str, value: Option<f64>) -> Record {
    let record = Record::new().with("series", series).with("category", category);
    match value {
        Some(value) => record.with("value", value),
        None => record.with_null("value"),
    }
}

fn chart_records() -> Vec<Record> {
    vec![
        record("A", "x", Some(10.0)),
        record("A", "y", Some(20.0)),
        record("B", "x", Some(5.0)),
        record("B", "y", None),
    ]
}

fn loaded(records: Vec<Record>) -> Result<DataSet, CccDataError> {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut data = DataSet::new(chart_type()?);
    data.load(records, &null_when_value_missing())?;
    Ok(data)
}

fn child_keys(data: &DataSet, id: DataId) -> Vec<String> {
    data.data(id)
        .unwrap()
        .child_refs()
        .map(|c| c.key().to_string())
        .collect()
}

/// Nested (key, datum keys) description of a grouped tree
fn describe(data: &DataSet, id: DataId, out: &mut Vec<String>) {
    let view = data.data(id).unwrap();
    let datums = view.datums().map(|d| d.key().to_string()).collect::<Vec<_>>();
    out.push(format!("{}@{} [{}]", view.abs_key(), view.depth(), datums.join(" ")));
    for child in view.children() {
        describe(data, *child, out);
    }
}

#[test]
fn test_group_by_series_and_category() -> Result<(), CccDataError> {
    let mut data = loaded(chart_records())?;
    let grouped = data.group_by_text(data.root(), "series,category", &GroupingOptions::default())?;

    assert_eq!(child_keys(&data, grouped), vec!["A", "B"]);
    let view = data.data(grouped)?;
    let a = view.child_by_key("A").unwrap();
    assert_eq!(child_keys(&data, a.id()), vec!["x", "y"]);
    assert!(a.child_refs().all(|c| c.datum_count() == 1));

    // The null (B, y) datum is post-filtered out, so B has no y child
    let b = view.child_by_key("B").unwrap();
    assert_eq!(child_keys(&data, b.id()), vec!["x"]);
    assert_eq!(b.child(0).unwrap().abs_key(), "B,x");
    assert_eq!(b.child(0).unwrap().abs_label(), "B ~ x");
    assert_eq!(view.leafs().len(), 3);

    // With the null filter off, the y child exists
    let with_nulls = data.group_by_text(
        data.root(),
        "series,category",
        &GroupingOptions::default().with_is_null(None),
    )?;
    let b = data.data(with_nulls)?.child_by_key("B").unwrap();
    assert_eq!(child_keys(&data, b.id()), vec!["x", "y"]);
    Ok(())
}

#[test]
fn test_add_extends_cached_grouping() -> Result<(), CccDataError> {
    let mut data = loaded(chart_records())?;
    let root = data.root();
    let grouped = data.group_by_text(root, "series,category", &GroupingOptions::default())?;
    let before = data.data(grouped)?.children().to_vec();
    let a = data.data(grouped)?.child_by_key("A").unwrap().id();
    let a_before = data.data(a)?.children().to_vec();
    let b = data.data(grouped)?.child_by_key("B").unwrap().id();
    let b_before = data.data(b)?.children().to_vec();

    data.add(vec![record("A", "z", Some(7.0))], &null_when_value_missing())?;

    let again = data.group_by_text(root, "series,category", &GroupingOptions::default())?;
    assert_eq!(again, grouped);
    assert_eq!(data.data(grouped)?.children(), before.as_slice());
    assert_eq!(data.data(b)?.children(), b_before.as_slice());
    assert_eq!(&data.data(a)?.children()[..2], a_before.as_slice());
    assert_eq!(child_keys(&data, a), vec!["x", "y", "z"]);
    assert_eq!(data.data(grouped)?.leafs().len(), 4);
    assert_eq!(data.data(grouped)?.datum_count(), 4);
    Ok(())
}

#[rstest]
#[case("series,category", 2)]
#[case("category,series", 3)]
#[case("value", 1)]
#[case("series|category", 1)]
fn test_additive_grouping_matches_fresh_load(
    #[case] grouping: &str,
    #[case] split: usize,
) -> Result<(), CccDataError> {
    let mut records = chart_records();
    records.push(record("C", "y", Some(1.0)));
    records.push(record("A", "w", Some(15.0)));
    records.push(record("B", "w", Some(2.5)));

    let mut fresh = loaded(records.clone())?;
    let fresh_root = fresh.group_by_text(fresh.root(), grouping, &GroupingOptions::default())?;

    let tail = records.split_off(split);
    let mut extended = loaded(records)?;
    let extended_root =
        extended.group_by_text(extended.root(), grouping, &GroupingOptions::default())?;
    extended.add(tail, &null_when_value_missing())?;

    let mut expected = Vec::new();
    describe(&fresh, fresh_root, &mut expected);
    let mut actual = Vec::new();
    describe(&extended, extended_root, &mut actual);
    assert_eq!(actual, expected);
    Ok(())
}

#[rstest]
#[case(FlattenMode::DfsPre, 1)]
#[case(FlattenMode::DfsPre, 2)]
#[case(FlattenMode::DfsPost, 1)]
#[case(FlattenMode::DfsPost, 4)]
fn test_additive_flattened_grouping_matches_fresh_load(
    #[case] mode: FlattenMode,
    #[case] split: usize,
) -> Result<(), CccDataError> {
    let spec = Arc::new(GroupingSpec::parse("series,category")?)
        .ensure(&EnsureOptions::default().with_flatten_mode(mode));
    let mut records = chart_records();
    records.push(Record::new().with("series", "C").with("value", 3.0));
    records.push(record("C", "y", Some(1.0)));
    records.push(record("A", "w", Some(15.0)));

    let mut fresh = loaded(records.clone())?;
    let fresh_root = fresh.group_by(fresh.root(), &[spec.clone()], &GroupingOptions::default())?;

    let tail = records.split_off(split);
    let mut extended = loaded(records)?;
    let extended_root =
        extended.group_by(extended.root(), &[spec], &GroupingOptions::default())?;
    // One add per record
    for record in tail {
        extended.add(vec![record], &null_when_value_missing())?;
    }

    let mut expected = Vec::new();
    describe(&fresh, fresh_root, &mut expected);
    let mut actual = Vec::new();
    describe(&extended, extended_root, &mut actual);
    assert_eq!(actual, expected);

    let flags = |data: &DataSet, id: DataId| {
        data.data(id)
            .unwrap()
            .child_refs()
            .map(|c| (c.is_flatten_group(), c.is_degenerate_flatten_group()))
            .collect::<Vec<_>>()
    };
    assert_eq!(flags(&extended, extended_root), flags(&fresh, fresh_root));
    assert_eq!(
        extended.data(extended_root)?.leafs().len(),
        fresh.data(fresh_root)?.leafs().len()
    );
    Ok(())
}

#[rstest]
#[case("series")]
#[case("series,category")]
#[case("category desc,value")]
fn test_leafs_partition_post_filtered_datums(#[case] grouping: &str) -> Result<(), CccDataError> {
    let mut data = loaded(chart_records())?;
    let grouped = data.group_by_text(data.root(), grouping, &GroupingOptions::default())?;
    let view = data.data(grouped)?;

    let mut seen = Vec::new();
    for leaf in view.leafs() {
        seen.extend(data.data(leaf)?.datum_ids().iter().copied());
    }
    let unique = seen.iter().copied().collect::<HashSet<_>>();
    assert_eq!(unique.len(), seen.len());

    let expected = data
        .data(data.root())?
        .datums()
        .filter(|d| !d.is_null())
        .map(|d| d.id())
        .collect::<HashSet<_>>();
    assert_eq!(unique, expected);
    Ok(())
}

#[test]
fn test_equivalent_specs_share_cache_entry() -> Result<(), CccDataError> {
    let mut data = loaded(chart_records())?;
    let root = data.root();
    let options = GroupingOptions::default();
    let from_text = data.group_by_text(root, "series,category", &options)?;
    let parsed = Arc::new(GroupingSpec::parse(" series , category asc ")?);
    let from_spec = data.group_by(root, &[parsed], &options)?;
    assert_eq!(from_text, from_spec);

    let bound = GroupingSpec::parse("series,category")?.bind(data.complex_type())?;
    assert_eq!(data.group_by(root, &[bound], &options)?, from_text);

    let other = data.group_by_text(root, "series,category", &options.clone().with_visible(Some(true)))?;
    assert_ne!(other, from_text);
    Ok(())
}

#[test]
fn test_selection_filtered_groupings_are_not_cached() -> Result<(), CccDataError> {
    let mut data = loaded(chart_records())?;
    let root = data.root();
    let options = GroupingOptions::default().with_selected(Some(true));
    let first = data.data(root)?.datum_ids()[0];
    data.set_selected(first, true)?;

    let selected = data.group_by_text(root, "series", &options)?;
    assert_eq!(data.data(selected)?.datum_count(), 1);

    // Uncached, so a new call sees the cleared selection
    data.clear_selected();
    let again = data.group_by_text(root, "series", &options)?;
    assert_ne!(again, selected);
    assert_eq!(data.data(again)?.datum_count(), 0);
    // The earlier result stays as it was
    assert_eq!(data.data(selected)?.datum_count(), 1);
    Ok(())
}

#[test]
fn test_flattened_post_order_collapses_single_null_branch() -> Result<(), CccDataError> {
    let ct = ComplexType::new()
        .with_dimension(DimensionType::new("region", ValueType::String))?
        .with_dimension(DimensionType::new("city", ValueType::String))?
        .with_dimension(DimensionType::new("sales", ValueType::Number))?;
    let mut data = DataSet::new(ct);
    data.load(
        vec![
            Record::new().with("region", "EU").with_null("city").with("sales", 3),
            Record::new().with("region", "US").with_null("city").with("sales", 4),
            Record::new().with("region", "US").with("city", "NY").with("sales", 5),
        ],
        &LoadOptions::default(),
    )?;
    let spec = Arc::new(GroupingSpec::parse("region,city")?)
        .ensure(&EnsureOptions::default().with_flatten_mode(FlattenMode::DfsPost));
    let grouped = data.group_by(data.root(), &[spec], &GroupingOptions::default())?;

    assert_eq!(
        child_keys(&data, grouped),
        vec!["EU", "US", "US,NY", "US#1", ""]
    );
    let view = data.data(grouped)?;
    let eu = view.child_by_key("EU").unwrap();
    assert!(eu.is_flatten_group());
    assert!(eu.is_degenerate_flatten_group());
    assert_eq!(eu.label(), "EU");

    // US has two children, so the null-city child and US itself are both kept
    let us_null = view.child_by_key("US").unwrap();
    assert!(!us_null.is_flatten_group());
    assert_eq!(us_null.datum_count(), 1);
    let us = view.child_by_key("US#1").unwrap();
    assert!(us.is_flatten_group());
    assert!(!us.is_degenerate_flatten_group());
    assert_eq!(us.datum_count(), 2);

    // Non-degenerate flatten groups duplicate their descendants and are not summed
    assert_eq!(data.dimensions_sum_abs(grouped, "sales")?, 12.0);
    Ok(())
}

#[test]
fn test_load_disposes_derived_views() -> Result<(), CccDataError> {
    let mut data = loaded(chart_records())?;
    let root = data.root();
    let grouped = data.group_by_text(root, "series", &GroupingOptions::default())?;
    let query = QuerySpec::from(QueryClause::new().with("series", "A"));
    let filtered = data.where_(root, Some(&query), &WhereOptions::default())?;
    assert_eq!(data.data(filtered)?.datum_count(), 2);

    data.load(vec![record("C", "x", Some(1.0))], &null_when_value_missing())?;
    assert!(data.is_disposed(grouped));
    assert!(data.is_disposed(filtered));
    assert!(matches!(data.data(grouped), Err(CccDataError::DataDisposed(_))));

    let regrouped = data.group_by_text(root, "series", &GroupingOptions::default())?;
    assert_eq!(child_keys(&data, regrouped), vec!["C"]);
    Ok(())
}

#[test]
fn test_where_view_receives_matching_additions() -> Result<(), CccDataError> {
    let mut data = loaded(chart_records())?;
    let root = data.root();
    let query = QuerySpec::from(QueryClause::new().with("series", "A"));
    let filtered = data.where_(root, Some(&query), &WhereOptions::default())?;
    let grouped = data.group_by_text(filtered, "category", &GroupingOptions::default())?;

    data.add(
        vec![record("A", "z", Some(1.0)), record("B", "z", Some(2.0))],
        &null_when_value_missing(),
    )?;
    assert_eq!(data.data(filtered)?.datum_count(), 3);
    assert_eq!(child_keys(&data, grouped), vec!["x", "y", "z"]);
    assert_eq!(data.where_(root, Some(&query), &WhereOptions::default())?, filtered);
    Ok(())
}
