//! # EMF
//!
//! Helpers for serializing CloudWatch Embedded Metrics via serde_json
//!
//! <https://docs.aws.amazon.com/AmazonCloudWatch/latest/monitoring/CloudWatch_Embedded_Metric_Format_Specification.html>

use super::context::MetricsContext;
use super::unit::{StorageResolution, Unit};
use super::validator::MAX_DIMENSION_SET_SIZE;
use super::Error;
use serde::Serialize;
use serde_json::{Map, Value};

/// CloudWatch only extracts the first 9 keys of each dimension set
pub const MAX_DIMENSIONS: usize = 9;

/// The Embedded Metric Format supports a maximum of 100 metrics per document
pub const MAX_METRICS_PER_EVENT: usize = 100;

/// The Embedded Metric Format supports a maximum of 100 values per document, counting metrics with
/// more than one value
pub const MAX_DATAPOINTS_PER_EVENT: usize = 100;

/// Root key of the metric directive
pub const AWS_KEY: &str = "_aws";

#[derive(Serialize)]
pub struct EmbeddedMetrics<'a> {
    /// Dimension values, properties and metric values
    #[serde(flatten)]
    pub root: Map<String, Value>,
    #[serde(rename = "_aws")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aws: Option<EmbeddedMetricsAws<'a>>,
}

#[derive(Serialize)]
pub struct EmbeddedMetricsAws<'a> {
    #[serde(rename = "Timestamp")]
    pub timestamp: u64,
    #[serde(flatten)]
    pub meta: &'a Map<String, Value>,
    // Contexts never carry more than one namespace
    #[serde(rename = "CloudWatchMetrics")]
    pub cloudwatch_metrics: [EmbeddedNamespace<'a>; 1],
}

#[derive(Serialize)]
pub struct EmbeddedNamespace<'a> {
    #[serde(rename = "Namespace")]
    pub namespace: &'a str,
    #[serde(rename = "Dimensions")]
    pub dimensions: &'a [Vec<&'a str>],
    #[serde(rename = "Metrics")]
    pub metrics: Vec<EmbeddedMetric<'a>>,
}

#[derive(Serialize)]
pub struct EmbeddedMetric<'a> {
    #[serde(rename = "Name")]
    pub name: &'a str,
    #[serde(rename = "Unit")]
    pub unit: Unit,
    /// Only written for high resolution metrics, CloudWatch assumes 60 otherwise
    #[serde(rename = "StorageResolution")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_resolution: Option<u64>,
}

/// Turns a [MetricsContext] into one or more EMF documents
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSerializer {
    disable_metric_extraction: bool,
}

impl LogSerializer {
    pub fn new(disable_metric_extraction: bool) -> Self {
        Self {
            disable_metric_extraction,
        }
    }

    /// Serialize a context into JSON documents, without trailing newlines
    ///
    /// * No document holds more than [MAX_METRICS_PER_EVENT] metrics
    /// * No document holds more than [MAX_DATAPOINTS_PER_EVENT] values of multi-valued metrics, the
    ///   remainder of a larger metric is drained into the following documents
    /// * At least one document is always produced
    pub fn serialize(&self, context: &MetricsContext) -> Result<Vec<String>, Error> {
        let dimension_sets = context.get_dimensions();

        let mut dimension_keys: Vec<Vec<&str>> = Vec::with_capacity(dimension_sets.len());
        let mut template = Map::new();
        for dimension_set in &dimension_sets {
            if dimension_set.len() > MAX_DIMENSION_SET_SIZE {
                return Err(Error::DimensionSetExceeded(format!(
                    "Maximum number of dimensions per dimension set allowed are {MAX_DIMENSION_SET_SIZE}, got {}",
                    dimension_set.len()
                )));
            }
            dimension_keys.push(dimension_set.keys().take(MAX_DIMENSIONS).map(String::as_str).collect());
            for (name, value) in dimension_set {
                template.insert(name.clone(), Value::String(value.clone()));
            }
        }
        for (name, value) in context.properties() {
            template.insert(name.clone(), value.clone());
        }
        // The metric directive owns this key
        let template: Map<String, Value> = template
            .into_iter()
            .filter(|(name, _)| self.disable_metric_extraction || name != AWS_KEY)
            .collect();

        let create_body = || EmbeddedMetrics {
            root: template.clone(),
            aws: (!self.disable_metric_extraction).then(|| EmbeddedMetricsAws {
                timestamp: context.timestamp(),
                meta: context.meta(),
                cloudwatch_metrics: [EmbeddedNamespace {
                    namespace: context.namespace(),
                    dimensions: &dimension_keys,
                    metrics: Vec::new(),
                }],
            }),
        };

        let mut batches = Vec::new();
        let mut body = create_body();
        let mut metrics_in_body = 0;
        // Only values of multi-valued metrics count against the datapoint cap
        let mut datapoints_in_body = 0;

        for (name, metric) in context.metrics() {
            let values = metric.values();
            let mut consumed = 0;

            while consumed < values.len() {
                let value = if let [single] = values {
                    consumed = 1;
                    Value::from(*single)
                } else {
                    let end = values.len().min(consumed + MAX_DATAPOINTS_PER_EVENT - datapoints_in_body);
                    let batch = values[consumed..end].to_vec();
                    datapoints_in_body += end - consumed;
                    consumed = end;
                    Value::from(batch)
                };
                body.root.insert(name.clone(), value);

                if let Some(aws) = body.aws.as_mut() {
                    aws.cloudwatch_metrics[0].metrics.push(EmbeddedMetric {
                        name,
                        unit: metric.unit(),
                        storage_resolution: match metric.storage_resolution() {
                            StorageResolution::High => Some(StorageResolution::High.seconds()),
                            StorageResolution::Standard => None,
                        },
                    });
                }
                metrics_in_body += 1;

                // A metric left with values always lands here, so a name appears once per document
                if metrics_in_body == MAX_METRICS_PER_EVENT || datapoints_in_body >= MAX_DATAPOINTS_PER_EVENT {
                    batches.push(serde_json::to_string(&body)?);
                    body = create_body();
                    metrics_in_body = 0;
                    datapoints_in_body = 0;
                }
            }
        }

        if batches.is_empty() || metrics_in_body > 0 {
            batches.push(serde_json::to_string(&body)?);
        }

        Ok(batches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::DimensionSet;
    use serde_json::json;

    fn set(pairs: &[(&str, &str)]) -> DimensionSet {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn parse(document: &str) -> Value {
        serde_json::from_str(document).unwrap()
    }

    fn metric_definitions(document: &Value) -> &Vec<Value> {
        document["_aws"]["CloudWatchMetrics"][0]["Metrics"].as_array().unwrap()
    }

    fn put(context: &mut MetricsContext, name: &str, value: f64) {
        context
            .put_metric(name, value, None, StorageResolution::Standard)
            .unwrap();
    }

    #[test]
    fn embedded_metrics() {
        let mut context = MetricsContext::new("MyApp");
        context.put_dimensions(set(&[("Service", "Orders")])).unwrap();
        context
            .put_metric("Latency", 100.0, Some(Unit::Milliseconds), StorageResolution::Standard)
            .unwrap();
        context
            .put_metric("Latency", 150.0, Some(Unit::Milliseconds), StorageResolution::Standard)
            .unwrap();

        let documents = LogSerializer::default().serialize(&context).unwrap();
        assert_eq!(
            documents,
            vec![format!(
                r#"{{"Service":"Orders","Latency":[100.0,150.0],"_aws":{{"Timestamp":{},"CloudWatchMetrics":[{{"Namespace":"MyApp","Dimensions":[["Service"]],"Metrics":[{{"Name":"Latency","Unit":"Milliseconds"}}]}}]}}}}"#,
                context.timestamp()
            )]
        );
    }

    #[test]
    fn empty_context_yields_one_document() {
        let context = MetricsContext::empty();
        let documents = LogSerializer::default().serialize(&context).unwrap();
        assert_eq!(documents.len(), 1);

        let document = parse(&documents[0]);
        assert_eq!(
            document,
            json!({
                "_aws": {
                    "Timestamp": context.timestamp(),
                    "CloudWatchMetrics": [
                        {"Namespace": "aws-embedded-metrics", "Dimensions": [], "Metrics": []}
                    ]
                }
            })
        );
    }

    #[test]
    fn serialize_dimensions_and_properties() {
        let mut context = MetricsContext::empty();
        context.put_dimensions(set(&[("b", "2"), ("a", "1")])).unwrap();
        context.put_dimensions(set(&[("c", "3")])).unwrap();
        context.set_property("RequestId", "abc");
        context.set_property("Nested", json!({"x": [1, 2]}));

        let document = parse(&LogSerializer::default().serialize(&context).unwrap()[0]);
        assert_eq!(document["a"], json!("1"));
        assert_eq!(document["b"], json!("2"));
        assert_eq!(document["c"], json!("3"));
        assert_eq!(document["RequestId"], json!("abc"));
        assert_eq!(document["Nested"], json!({"x": [1, 2]}));
        assert_eq!(
            document["_aws"]["CloudWatchMetrics"][0]["Dimensions"],
            json!([["b", "a"], ["c"]])
        );
    }

    #[test]
    fn only_nine_dimension_keys_are_advertised() {
        let mut context = MetricsContext::empty();
        let twelve: DimensionSet = (0..12).map(|i| (format!("d{i:02}"), format!("v{i}"))).collect();
        context.put_dimensions(twelve).unwrap();

        let document = parse(&LogSerializer::default().serialize(&context).unwrap()[0]);
        let keys = document["_aws"]["CloudWatchMetrics"][0]["Dimensions"][0].as_array().unwrap();
        assert_eq!(keys.len(), MAX_DIMENSIONS);
        assert_eq!(keys[0], json!("d00"));
        assert_eq!(keys[8], json!("d08"));
        // truncated keys still appear as values
        assert_eq!(document["d11"], json!("v11"));
    }

    #[test]
    fn default_and_custom_dimensions_combined_limit_exceeded() {
        let mut context = MetricsContext::empty();
        let thirty: DimensionSet = (0..30).map(|i| (format!("{i}"), "v".to_string())).collect();
        context.set_default_dimensions(set(&[("Host", "h1")]));
        context.put_dimensions(thirty).unwrap();

        assert!(matches!(
            LogSerializer::default().serialize(&context),
            Err(Error::DimensionSetExceeded(_))
        ));
    }

    #[test]
    fn storage_resolution_only_written_for_high() {
        let mut context = MetricsContext::empty();
        context
            .put_metric("Standard", 1.0, Some(Unit::Count), StorageResolution::Standard)
            .unwrap();
        context.put_metric("High", 2.0, None, StorageResolution::High).unwrap();

        let document = parse(&LogSerializer::default().serialize(&context).unwrap()[0]);
        assert_eq!(
            metric_definitions(&document),
            &vec![
                json!({"Name": "Standard", "Unit": "Count"}),
                json!({"Name": "High", "Unit": "None", "StorageResolution": 1}),
            ]
        );
        assert_eq!(document["Standard"], json!(1.0));
        assert_eq!(document["High"], json!(2.0));
    }

    #[test]
    fn exactly_100_metrics_fit_in_one_document() {
        let mut context = MetricsContext::empty();
        for i in 0..100 {
            put(&mut context, &format!("Metric-{i}"), i as f64);
        }
        let documents = LogSerializer::default().serialize(&context).unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(metric_definitions(&parse(&documents[0])).len(), 100);
    }

    #[test]
    fn serialize_more_than_100_metrics() {
        let mut context = MetricsContext::empty();
        for i in 0..101 {
            put(&mut context, &format!("Metric-{i}"), i as f64);
        }
        let documents = LogSerializer::default().serialize(&context).unwrap();
        assert_eq!(documents.len(), 2);

        let last = parse(&documents[1]);
        assert_eq!(metric_definitions(&last), &vec![json!({"Name": "Metric-100", "Unit": "None"})]);
        assert_eq!(last["Metric-100"], json!(100.0));

        let mut context = MetricsContext::empty();
        for i in 0..295 {
            put(&mut context, &format!("Metric-{i}"), 7.0);
        }
        let counts: Vec<usize> = LogSerializer::default()
            .serialize(&context)
            .unwrap()
            .iter()
            .map(|d| metric_definitions(&parse(d)).len())
            .collect();
        assert_eq!(counts, vec![100, 100, 95]);
    }

    #[test]
    fn serialize_more_than_100_datapoints() {
        let mut context = MetricsContext::empty();
        for i in 0..250 {
            put(&mut context, "Latency", i as f64);
        }

        let documents: Vec<Value> = LogSerializer::default()
            .serialize(&context)
            .unwrap()
            .iter()
            .map(|d| parse(d))
            .collect();
        let sizes: Vec<usize> = documents.iter().map(|d| d["Latency"].as_array().unwrap().len()).collect();
        assert_eq!(sizes, vec![100, 100, 50]);

        // values are drained in order
        let drained: Vec<f64> = documents
            .iter()
            .flat_map(|d| d["Latency"].as_array().unwrap().clone())
            .map(|v| v.as_f64().unwrap())
            .collect();
        assert_eq!(drained, (0..250).map(|i| i as f64).collect::<Vec<_>>());
        for document in &documents {
            assert_eq!(metric_definitions(document).len(), 1);
        }
    }

    #[test]
    fn single_value_metrics_are_not_repeated_while_draining() {
        let mut context = MetricsContext::empty();
        put(&mut context, "Once", 1.0);
        for i in 0..150 {
            put(&mut context, "Many", i as f64);
        }

        let documents: Vec<Value> = LogSerializer::default()
            .serialize(&context)
            .unwrap()
            .iter()
            .map(|d| parse(d))
            .collect();
        assert_eq!(documents.len(), 2);
        assert_eq!(documents[0]["Once"], json!(1.0));
        assert_eq!(documents[0]["Many"].as_array().unwrap().len(), 100);
        assert!(documents[1].get("Once").is_none());
        assert_eq!(documents[1]["Many"].as_array().unwrap().len(), 50);
        assert_eq!(metric_definitions(&documents[1]), &vec![json!({"Name": "Many", "Unit": "None"})]);
    }

    #[test]
    fn serialize_with_more_than_100_metrics_and_datapoints() {
        let mut context = MetricsContext::empty();
        for m in 0..295 {
            for i in 0..295 {
                put(&mut context, &format!("Metric-{m}"), i as f64);
            }
        }

        let documents = LogSerializer::default().serialize(&context).unwrap();
        // 295 * 295 = 87025 values, 100 per document
        assert_eq!(documents.len(), 871);

        let mut drained: std::collections::HashMap<String, Vec<f64>> = Default::default();
        for (index, document) in documents.iter().enumerate() {
            let document = parse(document);
            let definitions = metric_definitions(&document);
            assert!(definitions.len() <= MAX_METRICS_PER_EVENT);

            let mut datapoints = 0;
            for definition in definitions {
                let name = definition["Name"].as_str().unwrap();
                let values = document[name].as_array().unwrap();
                datapoints += values.len();
                drained
                    .entry(name.to_string())
                    .or_default()
                    .extend(values.iter().map(|v| v.as_f64().unwrap()));
            }
            let expected = if index == documents.len() - 1 { 25 } else { MAX_DATAPOINTS_PER_EVENT };
            assert_eq!(datapoints, expected);
        }

        assert_eq!(drained.len(), 295);
        let expected: Vec<f64> = (0..295).map(|i| i as f64).collect();
        for values in drained.values() {
            assert_eq!(values, &expected);
        }
    }

    #[test]
    fn datapoints_are_capped_across_metrics() {
        let mut context = MetricsContext::empty();
        for i in 0..100 {
            put(&mut context, "A", i as f64);
            put(&mut context, "B", i as f64);
        }

        let documents: Vec<Value> = LogSerializer::default()
            .serialize(&context)
            .unwrap()
            .iter()
            .map(|d| parse(d))
            .collect();
        assert_eq!(documents.len(), 2);
        assert_eq!(documents[0]["A"].as_array().unwrap().len(), 100);
        assert!(documents[0].get("B").is_none());
        assert_eq!(documents[1]["B"].as_array().unwrap().len(), 100);
        assert_eq!(metric_definitions(&documents[1]), &vec![json!({"Name": "B", "Unit": "None"})]);
    }

    #[test]
    fn partially_filled_document_is_topped_up() {
        let mut context = MetricsContext::empty();
        for i in 0..60 {
            put(&mut context, "A", i as f64);
            put(&mut context, "B", i as f64);
        }

        let documents: Vec<Value> = LogSerializer::default()
            .serialize(&context)
            .unwrap()
            .iter()
            .map(|d| parse(d))
            .collect();
        assert_eq!(documents.len(), 2);
        assert_eq!(documents[0]["A"].as_array().unwrap().len(), 60);
        assert_eq!(documents[0]["B"].as_array().unwrap().len(), 40);
        assert_eq!(documents[1]["B"].as_array().unwrap().len(), 20);
        assert_eq!(documents[1]["B"][0], json!(40.0));
    }

    #[test]
    fn aws_property_does_not_shadow_metric_directive() {
        let mut context = MetricsContext::empty();
        context.set_property(AWS_KEY, "user");
        put(&mut context, "Latency", 1.0);

        let document = &LogSerializer::default().serialize(&context).unwrap()[0];
        assert_eq!(document.matches("\"_aws\"").count(), 1);
        assert_eq!(parse(document)["_aws"]["CloudWatchMetrics"][0]["Metrics"][0]["Name"], json!("Latency"));

        // Without the directive the property is plain data
        let document = parse(&LogSerializer::new(true).serialize(&context).unwrap()[0]);
        assert_eq!(document["_aws"], json!("user"));
    }

    #[test]
    fn metric_extraction_disabled() {
        let mut context = MetricsContext::empty();
        context.put_dimensions(set(&[("Service", "Orders")])).unwrap();
        put(&mut context, "Latency", 12.0);

        let documents = LogSerializer::new(true).serialize(&context).unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(parse(&documents[0]), json!({"Service": "Orders", "Latency": 12.0}));
    }

    #[test]
    fn metadata_is_written_into_aws_block() {
        let mut context = MetricsContext::empty();
        context.put_metadata("LogGroupName", "my-group");

        let document = parse(&LogSerializer::default().serialize(&context).unwrap()[0]);
        assert_eq!(document["_aws"]["LogGroupName"], json!("my-group"));
        assert_eq!(document["_aws"]["Timestamp"], json!(context.timestamp()));
    }
}
