//! Behavioural tests for the end-to-end conflation pipeline.

use std::cell::RefCell;

use addrmerge_core::{
    AddressRecord, Conflation, ExistingFeature, FeatureKind, FeatureRef, ImportBatch,
    MatchOptions, SpatialIndex, Structure, Tags, conflate,
};
use geo::{Coord, Geometry, LineString, Point, Polygon};
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

const ORIGIN: Coord<f64> = Coord {
    x: 11.575,
    y: 48.137,
};

/// Offset `ORIGIN` by metres east and north.
#[expect(
    clippy::float_arithmetic,
    reason = "test positions features in metres around the origin"
)]
fn offset(east: f64, north: f64) -> Coord<f64> {
    Coord {
        x: ORIGIN.x + east / (111_320.0 * ORIGIN.y.to_radians().cos()),
        y: ORIGIN.y + north / 111_320.0,
    }
}

fn tags(pairs: &[(&str, &str)]) -> Tags {
    pairs
        .iter()
        .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
        .collect()
}

fn node(id: i64, location: Coord<f64>, version: u32, tags: Tags) -> ExistingFeature {
    ExistingFeature {
        id,
        geometry: Geometry::Point(Point::from(location)),
        tags,
        version,
        structure: Structure::Node(location),
    }
}

fn building() -> ExistingFeature {
    let ring = vec![
        offset(0.0, 0.0),
        offset(30.0, 0.0),
        offset(30.0, 30.0),
        offset(0.0, 30.0),
        offset(0.0, 0.0),
    ];
    ExistingFeature {
        id: 70,
        geometry: Geometry::Polygon(Polygon::new(LineString::from(ring), Vec::new())),
        tags: tags(&[("building", "house"), ("created_by", "JOSM 1.5")]),
        version: 2,
        structure: Structure::Way(vec![1, 2, 3, 4, 1]),
    }
}

fn main_street(city: Option<&str>) -> Tags {
    let mut address = tags(&[("addr:housenumber", "12"), ("addr:street", "Main St")]);
    if let Some(city) = city {
        address.insert("addr:city".to_owned(), city.to_owned());
    }
    address
}

#[derive(Default)]
struct ConflationWorld {
    features: RefCell<Vec<ExistingFeature>>,
    records: RefCell<Vec<AddressRecord>>,
    conflation: RefCell<Option<Conflation>>,
}

impl ConflationWorld {
    fn run(&self, options: &MatchOptions) {
        let batch = ImportBatch::new(self.records.borrow().iter().cloned()).expect("valid batch");
        let index = SpatialIndex::new(self.features.borrow().iter().cloned());
        *self.conflation.borrow_mut() = Some(conflate(&batch, &index, options));
    }

    fn with_conflation<T>(&self, check: impl FnOnce(&Conflation) -> T) -> T {
        let conflation = self.conflation.borrow();
        check(conflation.as_ref().expect("conflation has run"))
    }
}

#[fixture]
fn world() -> ConflationWorld {
    ConflationWorld::default()
}

#[given("an existing node with a complete Main St address")]
fn given_complete_node(#[from(world)] world: &ConflationWorld) {
    world.features.borrow_mut().push(node(
        99,
        offset(0.0, 0.0),
        1,
        main_street(Some("Springfield")),
    ));
}

#[given("an import record with the same complete address")]
fn given_duplicate_record(#[from(world)] world: &ConflationWorld) {
    world.records.borrow_mut().push(AddressRecord::new(
        1,
        Point::from(offset(40.0, 0.0)),
        main_street(Some("Springfield")),
    ));
}

#[given("an existing node at version 4 with a Main St address but no city")]
fn given_cityless_node(#[from(world)] world: &ConflationWorld) {
    world
        .features
        .borrow_mut()
        .push(node(99, offset(0.0, 0.0), 4, main_street(None)));
}

#[given("an import record with a complete Main St address three metres away")]
fn given_nearby_record(#[from(world)] world: &ConflationWorld) {
    world.records.borrow_mut().push(AddressRecord::new(
        1,
        Point::from(offset(3.0, 0.0)),
        main_street(Some("Springfield")),
    ));
}

#[given("an existing unaddressed building")]
fn given_building(#[from(world)] world: &ConflationWorld) {
    world.features.borrow_mut().push(building());
}

#[given("two import records inside the building")]
fn given_two_records_inside(#[from(world)] world: &ConflationWorld) {
    let mut records = world.records.borrow_mut();
    records.push(AddressRecord::new(
        1,
        Point::from(offset(10.0, 10.0)),
        tags(&[("addr:housenumber", "1"), ("addr:street", "High St")]),
    ));
    records.push(AddressRecord::new(
        2,
        Point::from(offset(20.0, 20.0)),
        tags(&[("addr:housenumber", "3"), ("addr:street", "High St")]),
    ));
}

#[given("one import record inside the building")]
fn given_one_record_inside(#[from(world)] world: &ConflationWorld) {
    world.records.borrow_mut().push(AddressRecord::new(
        1,
        Point::from(offset(15.0, 15.0)),
        tags(&[
            ("addr:housenumber", "1"),
            ("addr:street", "High St"),
            ("odbl", "clean"),
        ]),
    ));
}

#[when("the batch is conflated with default options")]
fn when_default(#[from(world)] world: &ConflationWorld) {
    world.run(&MatchOptions::default());
}

#[when("the batch is conflated with a five metre no-city radius")]
fn when_nocity(#[from(world)] world: &ConflationWorld) {
    let options = MatchOptions::default()
        .with_nocity(5.0)
        .expect("valid radius");
    world.run(&options);
}

#[when("the batch is conflated with a ten metre building radius")]
fn when_building(#[from(world)] world: &ConflationWorld) {
    let options = MatchOptions::default()
        .with_building(10.0)
        .expect("valid radius");
    world.run(&options);
}

#[then("the record is reported as a duplicate")]
fn then_duplicate(#[from(world)] world: &ConflationWorld) {
    world.with_conflation(|conflation| {
        assert_eq!(conflation.outcome.duplicates.iter().copied().collect::<Vec<_>>(), vec![1]);
        assert!(conflation.outcome.consumed.is_empty());
        assert!(conflation.new_records.is_empty());
    });
}

#[then("no modifications are produced")]
fn then_no_modifications(#[from(world)] world: &ConflationWorld) {
    world.with_conflation(|conflation| assert!(conflation.modifications.is_empty()));
}

#[then("the record is reported as consumed")]
fn then_consumed(#[from(world)] world: &ConflationWorld) {
    world.with_conflation(|conflation| {
        assert_eq!(conflation.outcome.consumed.iter().copied().collect::<Vec<_>>(), vec![1]);
        assert!(conflation.outcome.unmatched.is_empty());
    });
}

#[then("node 99 is modified to version 5 with the imported city")]
fn then_node_modified(#[from(world)] world: &ConflationWorld) {
    world.with_conflation(|conflation| {
        let [modification] = conflation.modifications.as_slice() else {
            panic!("expected exactly one modification");
        };
        assert_eq!(modification.feature, FeatureRef::new(FeatureKind::Node, 99));
        assert_eq!(modification.new_version, 5);
        assert_eq!(
            modification.merged_tags.get("addr:city").map(String::as_str),
            Some("Springfield")
        );
    });
}

#[then("both records are reported as unmatched")]
fn then_both_unmatched(#[from(world)] world: &ConflationWorld) {
    world.with_conflation(|conflation| {
        assert_eq!(conflation.outcome.unmatched.iter().copied().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(conflation.new_records.len(), 2);
    });
}

#[then("the building is modified without stoplisted tags")]
fn then_building_modified(#[from(world)] world: &ConflationWorld) {
    world.with_conflation(|conflation| {
        let [modification] = conflation.modifications.as_slice() else {
            panic!("expected exactly one modification");
        };
        assert_eq!(modification.feature, FeatureRef::new(FeatureKind::Way, 70));
        assert_eq!(modification.new_version, 3);
        assert_eq!(
            modification.merged_tags.get("building").map(String::as_str),
            Some("house")
        );
        assert!(modification.merged_tags.contains_key("addr:housenumber"));
        assert!(!modification.merged_tags.contains_key("created_by"));
        assert!(!modification.merged_tags.contains_key("odbl"));
        assert_eq!(modification.structure, Structure::Way(vec![1, 2, 3, 4, 1]));
    });
}

#[scenario(path = "tests/features/conflation.feature", index = 0)]
fn scenario_exact_duplicate(world: ConflationWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/conflation.feature", index = 1)]
fn scenario_nearby_node(world: ConflationWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/conflation.feature", index = 2)]
fn scenario_ambiguous_building(world: ConflationWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/conflation.feature", index = 3)]
fn scenario_single_building(world: ConflationWorld) {
    let _ = world;
}
