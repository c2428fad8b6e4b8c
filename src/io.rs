/**
 * BlendReco
 * Copyright (C) 2018 Sebastian Schelter
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program. If not, see <http://www.gnu.org/licenses/>.
 */

use std::fs::{self, File};
use std::io::{self, stdout, BufReader, BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use tracing::info;

use crate::error::{RecoError, Result};
use crate::evaluation::MetricTable;
use crate::models::TrainedModelSet;
use crate::types::{EventType, InteractionEvent, ItemProperty};

/// Reads a CSV input file. We expect a header line naming the columns, separated by commas.
pub fn csv_reader<P: AsRef<Path>>(path: P) -> Result<csv::Reader<File>> {
    let reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    Ok(reader)
}

/// Position of the first column named like one of `names`.
fn column(headers: &csv::StringRecord, names: &[&str]) -> Result<usize> {
    headers.iter()
        .position(|header| names.iter().any(|name| header.eq_ignore_ascii_case(name)))
        .ok_or_else(|| RecoError::data(Some(1), format!("missing column '{}'", names[0])))
}

fn field<'r>(record: &'r csv::StringRecord, index: usize, line: u64) -> Result<&'r str> {
    record.get(index)
        .ok_or_else(|| RecoError::data(Some(line), format!("record has no field #{}", index + 1)))
}

fn line_of(record: &csv::StringRecord, fallback: u64) -> u64 {
    record.position().map(|position| position.line()).unwrap_or(fallback)
}

/// Interaction events with the columns `timestamp`, `visitorid`, `event` and `itemid`
/// (alternatively `user_id`, `event_type` and `item_id`). Additional columns are ignored.
pub fn events_from_csv<R: io::Read>(reader: &mut csv::Reader<R>) -> Result<Vec<InteractionEvent>> {

    let headers = reader.headers()?.clone();
    let timestamp_column = column(&headers, &["timestamp", "ts"])?;
    let user_column = column(&headers, &["visitorid", "user_id", "userid", "user"])?;
    let event_column = column(&headers, &["event", "event_type"])?;
    let item_column = column(&headers, &["itemid", "item_id", "item"])?;

    let mut events = Vec::new();

    for (position, result) in reader.records().enumerate() {
        let record = result?;
        let line = line_of(&record, position as u64 + 2);

        let timestamp_field = field(&record, timestamp_column, line)?;
        let timestamp: i64 = timestamp_field.parse()
            .map_err(|_| RecoError::data(Some(line), format!("invalid timestamp '{}'", timestamp_field)))?;

        let event_type = field(&record, event_column, line)?.parse::<EventType>()
            .map_err(|error| match error {
                RecoError::Data { message, .. } => RecoError::data(Some(line), message),
                other => other,
            })?;

        events.push(InteractionEvent {
            user_id: field(&record, user_column, line)?.to_string(),
            item_id: field(&record, item_column, line)?.to_string(),
            event_type,
            timestamp,
        });
    }

    Ok(events)
}

/// Item properties with the columns `itemid`, `property` and `value`
/// (alternatively `item_id` and `name`).
pub fn properties_from_csv<R: io::Read>(reader: &mut csv::Reader<R>) -> Result<Vec<ItemProperty>> {

    let headers = reader.headers()?.clone();
    let item_column = column(&headers, &["itemid", "item_id", "item"])?;
    let name_column = column(&headers, &["property", "name"])?;
    let value_column = column(&headers, &["value"])?;

    let mut properties = Vec::new();

    for (position, result) in reader.records().enumerate() {
        let record = result?;
        let line = line_of(&record, position as u64 + 2);

        properties.push(ItemProperty {
            item_id: field(&record, item_column, line)?.to_string(),
            name: field(&record, name_column, line)?.to_string(),
            value: field(&record, value_column, line)?.to_string(),
        });
    }

    Ok(properties)
}

pub fn read_events<P: AsRef<Path>>(path: P) -> Result<Vec<InteractionEvent>> {
    let mut reader = csv_reader(&path)?;
    let events = events_from_csv(&mut reader)?;
    info!("Read {} events from {}", events.len(), path.as_ref().display());
    Ok(events)
}

pub fn read_properties<P: AsRef<Path>>(path: P) -> Result<Vec<ItemProperty>> {
    let mut reader = csv_reader(&path)?;
    let properties = properties_from_csv(&mut reader)?;
    info!("Read {} item properties from {}", properties.len(), path.as_ref().display());
    Ok(properties)
}

/// Stores a trained model set as JSON. Floats are written with enough digits to be read back
/// bit for bit.
pub fn save_models<P: AsRef<Path>>(models: &TrainedModelSet, path: P) -> Result<()> {
    let mut writer = BufWriter::new(File::create(&path)?);
    serde_json::to_writer(&mut writer, models)?;
    writer.flush()?;
    info!("Saved models to {}", path.as_ref().display());
    Ok(())
}

pub fn load_models<P: AsRef<Path>>(path: P) -> Result<TrainedModelSet> {
    let reader = BufReader::new(File::open(&path)?);
    let models: TrainedModelSet = serde_json::from_reader(reader)?;
    info!("Loaded models from {}", path.as_ref().display());
    Ok(models)
}

/// Writes one JSON document per line. If an `output_path` is supplied, we write to a file at
/// the specified path, otherwise, we output to stdout.
pub fn write_json_lines<T: Serialize>(entries: &[T], output_path: Option<&str>) -> Result<()> {

    let mut out: Box<dyn Write> = match output_path {
        Some(path) => Box::new(BufWriter::new(File::create(Path::new(path))?)),
        _ => Box::new(stdout()),
    };

    for entry in entries.iter() {
        serde_json::to_writer(&mut out, entry)?;
        writeln!(out)?;
    }
    out.flush()?;

    Ok(())
}

/// Writes `model_comparison.csv` (one row per model) and `summary.json` into `output_dir`.
pub fn write_metrics<P: AsRef<Path>>(table: &MetricTable, output_dir: P) -> Result<()> {

    let output_dir = output_dir.as_ref();
    fs::create_dir_all(output_dir)?;

    let names = MetricTable::metric_names(table.k);

    let mut writer = csv::Writer::from_path(output_dir.join("model_comparison.csv"))?;
    writer.write_record(std::iter::once("model").chain(names.iter().map(|name| name.as_str())))?;

    for (model, metrics) in table.results.iter() {
        let mut record = vec![model.clone()];
        for name in names.iter() {
            let value = metrics.get(name).cloned().unwrap_or(0.0);
            record.push(format!("{:.6}", value));
        }
        writer.write_record(&record)?;
    }
    writer.flush()?;

    let mut summary = BufWriter::new(File::create(output_dir.join("summary.json"))?);
    serde_json::to_writer_pretty(&mut summary, table)?;
    summary.flush()?;

    info!("Wrote evaluation results to {}", output_dir.display());
    Ok(())
}

#[cfg(test)]
mod tests {

    use std::collections::BTreeMap;
    use std::fs;

    use super::{events_from_csv, load_models, properties_from_csv, save_models, write_json_lines, write_metrics};
    use crate::config::Config;
    use crate::error::RecoError;
    use crate::evaluation::MetricTable;
    use crate::models::{train_from_events, ModelKind};
    use crate::types::{EventType, Recommendation};

    fn reader(data: &str) -> csv::Reader<&[u8]> {
        csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(data.as_bytes())
    }

    const EVENTS: &str = "timestamp,visitorid,event,itemid,transactionid\n\
        1433221332117,257597,view,355908,\n\
        1433224214164,992329,view,248676,\n\
        1433221955914,257597,addtocart,248676,\n\
        1433222276276,483717,transaction,355908,4000\n\
        1433222280000,483717,view,111111,\n\
        1433222290000,992329,addtocart,111111,\n";

    const PROPERTIES: &str = "timestamp,itemid,property,value\n\
        1435460400000,355908,categoryid,1338\n\
        1435460400000,355908,title,wooden desk lamp\n\
        1441508400000,248676,title,wooden office desk\n\
        1441508400000,111111,title,smart phone\n";

    #[test]
    fn reads_retailrocket_events() {
        let events = events_from_csv(&mut reader(EVENTS)).unwrap();

        assert_eq!(events.len(), 6);
        assert_eq!(events[0].user_id, "257597");
        assert_eq!(events[0].item_id, "355908");
        assert_eq!(events[0].event_type, EventType::View);
        assert_eq!(events[2].event_type, EventType::AddToCart);
        assert_eq!(events[3].event_type, EventType::Transaction);
        assert_eq!(events[3].timestamp, 1433222276276);
    }

    #[test]
    fn malformed_records_name_their_line() {
        let data = "timestamp,visitorid,event,itemid\n1,u1,view,a\n2,u2,click,b\n";

        match events_from_csv(&mut reader(data)) {
            Err(RecoError::Data { line, message }) => {
                assert_eq!(line, Some(3));
                assert!(message.contains("click"));
            },
            other => panic!("expected a data error, got {:?}", other),
        }

        let data = "timestamp,visitorid,event,itemid\nyesterday,u1,view,a\n";
        match events_from_csv(&mut reader(data)) {
            Err(RecoError::Data { line, .. }) => assert_eq!(line, Some(2)),
            other => panic!("expected a data error, got {:?}", other),
        }

        let data = "timestamp,visitorid,itemid\n1,u1,a\n";
        assert!(events_from_csv(&mut reader(data)).is_err());
    }

    #[test]
    fn reads_retailrocket_properties() {
        let properties = properties_from_csv(&mut reader(PROPERTIES)).unwrap();

        assert_eq!(properties.len(), 4);
        assert_eq!(properties[1].item_id, "355908");
        assert_eq!(properties[1].name, "title");
        assert_eq!(properties[1].value, "wooden desk lamp");
    }

    #[test]
    fn reloaded_models_recommend_identically() {
        let events = events_from_csv(&mut reader(EVENTS)).unwrap();
        let properties = properties_from_csv(&mut reader(PROPERTIES)).unwrap();
        let config = Config { cf_rank: 3, cf_iterations: 4, num_threads: 1, ..Config::default() };

        let models = train_from_events(&events, &properties, &config).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models.json");
        save_models(&models, &path).unwrap();
        let reloaded = load_models(&path).unwrap();

        assert_eq!(models, reloaded);

        for kind in ModelKind::ALL.iter() {
            for user_id in &["257597", "992329", "483717", "unknown"] {
                let original = models.recommend(kind.name(), user_id, 3);
                let restored = reloaded.recommend(kind.name(), user_id, 3);
                match (original, restored) {
                    (Ok(original), Ok(restored)) => assert_eq!(original, restored),
                    (Err(_), Err(_)) => {},
                    (original, restored) => panic!("{:?} != {:?}", original, restored),
                }
            }
        }

        assert_eq!(
            models.similar_items("355908", 2).unwrap(),
            reloaded.similar_items("355908", 2).unwrap()
        );
    }

    #[test]
    fn writes_json_lines_and_metrics() {
        let dir = tempfile::tempdir().unwrap();

        let path = dir.path().join("recommendations.json");
        let recommendations = vec![
            Recommendation { item_id: "a".to_string(), score: 0.5 },
            Recommendation { item_id: "b".to_string(), score: 0.25 },
        ];
        write_json_lines(&recommendations, path.to_str()).unwrap();

        let written = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines, vec![r#"{"item_id":"a","score":0.5}"#, r#"{"item_id":"b","score":0.25}"#]);

        let mut metrics = BTreeMap::new();
        for name in MetricTable::metric_names(5).iter() {
            metrics.insert(name.clone(), 0.5);
        }
        let mut results = BTreeMap::new();
        results.insert("hybrid".to_string(), metrics);
        let table = MetricTable { k: 5, users_evaluated: 3, results };

        write_metrics(&table, dir.path().join("results")).unwrap();

        let comparison = fs::read_to_string(dir.path().join("results/model_comparison.csv")).unwrap();
        assert_eq!(
            comparison,
            "model,precision@5,recall@5,ndcg@5,map@5\nhybrid,0.500000,0.500000,0.500000,0.500000\n"
        );

        let summary = fs::read_to_string(dir.path().join("results/summary.json")).unwrap();
        let parsed: MetricTable = serde_json::from_str(&summary).unwrap();
        assert_eq!(parsed, table);
    }
}
