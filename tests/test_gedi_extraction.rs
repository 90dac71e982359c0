use spacelidar::core::assemble::BEAM_NAME_FIELD;
use spacelidar::core::schema::GEDI_FILL_VALUE;
use spacelidar::types::ValueType;
use spacelidar::{resolve, AttributeValue, ExtractionConfig, Extractor, GeometryMode, LidarError, MemorySource};

/// Synthetic GEDI beam of `rows` shots. Even shots pass the quality filter;
/// odd shots fail for one reason each: degraded (1), low sensitivity (3),
/// l2b flag (5), l2a flag (7) or fill latitude (9).
fn add_gedi_beam(source: &mut MemorySource, beam: &str, rows: usize) {
    let schema = resolve("GEDI02_B").expect("GEDI02_B schema");
    for field in schema.fields {
        let path = field.resolve_path(beam);
        match field.value_type {
            ValueType::Float => {
                let values = (0..rows)
                    .map(|i| match field.name {
                        "latitude_lastbin" if i % 10 == 9 => GEDI_FILL_VALUE,
                        "latitude_lastbin" => -3.0 + i as f64 * 6e-4,
                        "longitude_lastbin" => -60.0 + i as f64 * 3e-4,
                        "sensitivity" if i % 10 == 3 => 0.5,
                        "sensitivity" => 0.97,
                        "cover" => i as f64 / 100.0,
                        _ => 1.0,
                    })
                    .collect();
                source.insert_f64(&path, values);
            }
            ValueType::Int => {
                let values = (0..rows)
                    .map(|i| match field.name {
                        "degrade_flag" => i64::from(i % 10 == 1),
                        "l2b_quality_flag" => i64::from(i % 10 != 5),
                        "l2a_quality_flag" => i64::from(i % 10 != 7),
                        "shot_number" => 1_000_000 + i as i64,
                        _ => 1,
                    })
                    .collect();
                source.insert_i64(&path, values);
            }
        }
    }
}

/// Two beams: BEAM0000 with 100 shots, BEAM0101 present but empty
fn two_beam_granule() -> MemorySource {
    let mut source = MemorySource::new("GEDI02_B_synthetic.h5");
    source.set_attr("/", "short_name", "GEDI_L2B");
    add_gedi_beam(&mut source, "BEAM0000", 100);
    source.add_group("BEAM0101");
    source
}

#[test]
fn test_gedi_two_beams_one_missing() {
    let schema = resolve("GEDI02_B").expect("GEDI02_B schema");
    let source = two_beam_granule();
    let config = ExtractionConfig::default();

    let outcome = Extractor::new(schema, &config)
        .expect("Failed to create extractor")
        .extract(&source)
        .expect("Extraction should survive a missing beam");

    println!("Features: {}", outcome.collection.len());
    println!("Skipped: {:?}", outcome.report.skipped);

    // Shots 0, 2, 4, 6, 8 of each decade pass; 1, 3, 5, 7, 9 fail
    let passing: Vec<i64> = outcome
        .collection
        .features()
        .iter()
        .filter_map(|f| outcome.collection.attribute(f, "shot_number").and_then(|v| v.as_i64()))
        .collect();
    assert!(passing.iter().all(|shot| (shot - 1_000_000) % 2 == 0));

    assert_eq!(outcome.report.skipped.len(), 1);
    assert_eq!(outcome.report.skipped[0].beam, "BEAM0101");
    assert_eq!(outcome.report.beams.len(), 1);

    let totals = outcome.report.totals();
    assert_eq!(totals.rows_read, 100);
    assert_eq!(totals.kept, outcome.collection.len());
    assert_eq!(totals.dropped_fill, 10);
    assert_eq!(totals.dropped_quality, 40);
    assert_eq!(totals.kept, 50);
}

#[test]
fn test_gedi_exactly_ten_passing_shots() {
    let schema = resolve("GEDI02_B").expect("GEDI02_B schema");
    let mut source = two_beam_granule();

    // Keep only every tenth shot: degrade the even shots that are not multiples of ten
    let degrade: Vec<i64> = (0..100).map(|i| if i % 10 == 0 { 0 } else { 1 }).collect();
    source.insert_i64("BEAM0000/geolocation/degrade_flag", degrade);

    let config = ExtractionConfig::default();
    let outcome = Extractor::new(schema, &config)
        .expect("Failed to create extractor")
        .extract(&source)
        .expect("Extraction failed");

    assert_eq!(outcome.collection.len(), 10);
    assert_eq!(outcome.report.skipped.len(), 1);
    for feature in outcome.collection.features() {
        assert_eq!(feature.beam_name, "BEAM0000");
        assert_eq!(
            outcome.collection.attribute(feature, "degrade_flag"),
            Some(AttributeValue::Integer(0))
        );
    }
}

#[test]
fn test_fill_rows_never_extracted_even_unfiltered() {
    let schema = resolve("GEDI02_B").expect("GEDI02_B schema");
    let source = two_beam_granule();
    let config = ExtractionConfig {
        apply_quality_filter: false,
        ..Default::default()
    };

    let outcome = Extractor::new(schema, &config)
        .expect("Failed to create extractor")
        .extract(&source)
        .expect("Extraction failed");

    // Only the ten fill-latitude shots are dropped
    assert_eq!(outcome.collection.len(), 90);
    for feature in outcome.collection.features() {
        let lat = outcome
            .collection
            .attribute(feature, "latitude_lastbin")
            .and_then(|v| v.as_f64())
            .expect("latitude is carried");
        assert_ne!(lat, GEDI_FILL_VALUE);
    }
}

#[test]
fn test_truncated_beam_is_skipped_and_run_continues() {
    let schema = resolve("GEDI02_B").expect("GEDI02_B schema");
    let mut source = two_beam_granule();
    add_gedi_beam(&mut source, "BEAM1011", 40);
    // One dataset of BEAM1011 lost its last shots
    source.insert_f64("BEAM1011/sensitivity", vec![0.97; 37]);

    let config = ExtractionConfig::default();
    let outcome = Extractor::new(schema, &config)
        .expect("Failed to create extractor")
        .extract(&source)
        .expect("A truncated beam must not fail the run");

    println!("Skipped: {:?}", outcome.report.skipped);

    let truncated = outcome
        .report
        .skipped
        .iter()
        .find(|skipped| skipped.beam == "BEAM1011")
        .expect("BEAM1011 is reported as skipped");
    assert!(truncated.reason.contains("sensitivity"));
    assert!(truncated.reason.contains("37 rows, expected 40"));
    assert_eq!(outcome.report.skipped.len(), 2);

    assert_eq!(outcome.collection.len(), 50);
    assert!(outcome
        .collection
        .features()
        .iter()
        .all(|feature| feature.beam_name == "BEAM0000"));
    assert_eq!(outcome.report.totals().rows_read, 100);
}

#[test]
fn test_point_and_polygon_share_attributes() {
    let schema = resolve("GEDI02_B").expect("GEDI02_B schema");
    let source = two_beam_granule();

    let points = ExtractionConfig::default();
    let polygons = ExtractionConfig {
        geometry_mode: GeometryMode::Polygon,
        ..Default::default()
    };

    let point_run = Extractor::new(schema, &points).unwrap().extract(&source).unwrap();
    let polygon_run = Extractor::new(schema, &polygons).unwrap().extract(&source).unwrap();

    assert_eq!(point_run.collection.len(), polygon_run.collection.len());
    assert_eq!(point_run.collection.layout(), polygon_run.collection.layout());
    for (p, q) in point_run
        .collection
        .features()
        .iter()
        .zip(polygon_run.collection.features())
    {
        assert_eq!(p.attributes, q.attributes);
        assert_eq!(
            point_run.collection.attribute(p, BEAM_NAME_FIELD),
            polygon_run.collection.attribute(q, BEAM_NAME_FIELD)
        );
        assert!(!p.geometry.is_polygon());
        assert!(q.geometry.is_polygon());
    }
}

#[test]
fn test_wrong_product_is_fatal() {
    let schema = resolve("GEDI02_B").expect("GEDI02_B schema");
    let mut source = two_beam_granule();
    source.set_attr("/", "short_name", "ATL08");

    let config = ExtractionConfig::default();
    let result = Extractor::new(schema, &config).unwrap().extract(&source);
    assert!(matches!(result, Err(LidarError::ProductMismatch { .. })));
}

#[test]
fn test_unsupported_product() {
    assert!(matches!(resolve("ATL03"), Err(LidarError::UnsupportedProduct(_))));
    assert_eq!(resolve("gedi_l2b").unwrap().id.to_string(), "GEDI02_B");
}
