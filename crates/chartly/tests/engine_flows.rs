// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

use async_trait::async_trait;
use chartly::classifier::Classification;
use chartly::error::ClassifierResult;
use chartly::{
    AnalysisErrorCode, ChartClassifier, ChartData, ChartType, ChartlyEngine, ChartlyError,
    EngineConfig, RenderRequest, SuggestRequest,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const PNG_HEADER: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

struct CountingClassifier {
    label: &'static str,
    calls: AtomicUsize,
}

#[async_trait]
impl ChartClassifier for CountingClassifier {
    async fn classify(&self, _image: &[u8], _mime_type: &str) -> ClassifierResult<Classification> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Classification {
            label: self.label.to_string(),
            confidence: 0.9,
        })
    }
    fn name(&self) -> &str {
        "counting"
    }
}

fn engine_with(label: &'static str, config: EngineConfig) -> (ChartlyEngine, Arc<CountingClassifier>) {
    let classifier = Arc::new(CountingClassifier {
        label,
        calls: AtomicUsize::new(0),
    });
    let engine = ChartlyEngine::new(config, classifier.clone()).unwrap();
    (engine, classifier)
}

fn sales_csv() -> String {
    let regions = ["north", "south", "east", "west"];
    let mut csv = String::from("date,revenue,region\n");
    for day in 0..40 {
        csv.push_str(&format!(
            "2024-02-{:02},{},{}\n",
            (day % 28) + 1,
            100 + (day * 17) % 90,
            regions[day % 4]
        ));
    }
    csv
}

fn suggest(engine: &ChartlyEngine, session_id: &str) -> Result<Vec<chartly::ChartSuggestion>, ChartlyError> {
    engine
        .suggest(&SuggestRequest {
            session_id: session_id.to_string(),
            x: None,
            y: None,
        })
        .map(|r| r.suggestions)
}

#[test]
fn date_revenue_region_recommends_bar_grouped_by_region() {
    let (engine, _) = engine_with("bar", EngineConfig::default());
    let upload = engine.upload_csv(Some("sales.csv"), sales_csv().as_bytes()).unwrap();
    let dtypes: Vec<_> = upload.columns.iter().map(|c| c.dtype.as_str()).collect();
    assert_eq!(dtypes, vec!["datetime", "numeric", "categorical"]);
    assert_eq!(upload.preview.len(), 20);

    let suggestions = suggest(&engine, &upload.session_id).unwrap();
    let recommended: Vec<_> = suggestions.iter().filter(|s| s.recommended).collect();
    assert_eq!(recommended.len(), 1);
    assert_eq!(recommended[0].chart_type, ChartType::Bar);

    let render = engine
        .render(&RenderRequest {
            session_id: upload.session_id.clone(),
            chart_type: "bar".to_string(),
            x: recommended[0].x.clone(),
            y: recommended[0].y.clone(),
        })
        .unwrap();
    let ChartData::Categories {
        category,
        value,
        categories,
        ..
    } = render.spec.data
    else {
        panic!("bar chart should carry categories");
    };
    assert_eq!(category, "region");
    assert_eq!(value.as_deref(), Some("revenue"));
    assert_eq!(categories.len(), 4);
}

#[test]
fn every_suggestion_renders() {
    let (engine, _) = engine_with("bar", EngineConfig::default());
    let datasets = [
        sales_csv(),
        "a,b\n1,9\n2,7\n3,8\n4,2\n5,6\n6,1\n".to_string(),
        "colour,shape\nred,square\nblue,circle\nred,circle\nblue,square\nred,square\n".to_string(),
        "v\n1.5\n2.5\n9\n4\n".to_string(),
    ];
    for csv in datasets {
        let upload = engine.upload_csv(None, csv.as_bytes()).unwrap();
        for pins in [(None, None), (Some(upload.columns[0].name.clone()), None)] {
            let suggestions = engine
                .suggest(&SuggestRequest {
                    session_id: upload.session_id.clone(),
                    x: pins.0.clone(),
                    y: pins.1.clone(),
                })
                .unwrap()
                .suggestions;
            assert!(!suggestions.is_empty());
            for suggestion in suggestions {
                let result = engine.render(&RenderRequest {
                    session_id: upload.session_id.clone(),
                    chart_type: suggestion.chart_type.to_string(),
                    x: suggestion.x.clone(),
                    y: suggestion.y.clone(),
                });
                assert!(
                    result.is_ok(),
                    "{} failed to render: {:?}",
                    suggestion.chart_type,
                    result.err()
                );
            }
        }
    }
}

#[test]
fn render_without_axes_follows_the_suggestion() {
    let (engine, _) = engine_with("bar", EngineConfig::default());
    let mut csv = String::from("customer,revenue,region\n");
    for i in 0..40 {
        csv.push_str(&format!("c{},{},{}\n", i % 20, 100 + i * 3, ["north", "south", "east"][i % 3]));
    }
    let upload = engine.upload_csv(Some("customers.csv"), csv.as_bytes()).unwrap();
    let top = suggest(&engine, &upload.session_id).unwrap().remove(0);
    assert_eq!(top.chart_type, ChartType::Bar);
    assert_eq!(top.x.as_deref(), Some("region"));

    let render = |x: Option<String>, y: Option<String>, chart: &str| {
        engine.render(&RenderRequest {
            session_id: upload.session_id.clone(),
            chart_type: chart.to_string(),
            x,
            y,
        })
    };
    let bare = render(None, None, "bar").unwrap();
    let pinned = render(top.x.clone(), top.y.clone(), "bar").unwrap();
    assert_eq!(bare.spec, pinned.spec);
    let ChartData::Categories { category, .. } = bare.spec.data else {
        panic!("bar chart should carry categories");
    };
    assert_eq!(category, "region");

    assert!(matches!(
        render(None, None, "histogram"),
        Err(ChartlyError::UnsupportedChartType { .. })
    ));
}

#[test]
fn text_only_dataset_has_no_suggestions() {
    let (engine, _) = engine_with("bar", EngineConfig::default());
    let upload = engine
        .upload_csv(None, b"note,comment\nalpha one,first\nbeta two,second\ngamma three,third\n")
        .unwrap();
    assert!(suggest(&engine, &upload.session_id).unwrap().is_empty());
}

#[test]
fn unknown_session_is_not_found_everywhere() {
    let (engine, classifier) = engine_with("bar", EngineConfig::default());
    assert!(matches!(
        suggest(&engine, "missing"),
        Err(ChartlyError::SessionNotFound { .. })
    ));
    assert!(matches!(
        engine.render(&RenderRequest {
            session_id: "missing".to_string(),
            chart_type: "bar".to_string(),
            x: None,
            y: None,
        }),
        Err(ChartlyError::SessionNotFound { .. })
    ));
    let rt = tokio::runtime::Runtime::new().unwrap();
    assert!(matches!(
        rt.block_on(engine.analyze_image("missing", PNG_HEADER)),
        Err(ChartlyError::SessionNotFound { .. })
    ));
    assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn expired_session_fails_every_operation() {
    let mut config = EngineConfig::default();
    config.sessions.ttl_secs = 1;
    let (engine, classifier) = engine_with("bar", config);
    let upload = engine.upload_csv(None, sales_csv().as_bytes()).unwrap();
    assert!(suggest(&engine, &upload.session_id).is_ok());

    tokio::time::sleep(Duration::from_millis(1100)).await;

    assert!(matches!(
        suggest(&engine, &upload.session_id),
        Err(ChartlyError::SessionNotFound { .. })
    ));
    assert!(matches!(
        engine.render(&RenderRequest {
            session_id: upload.session_id.clone(),
            chart_type: "bar".to_string(),
            x: None,
            y: None,
        }),
        Err(ChartlyError::SessionNotFound { .. })
    ));
    assert!(matches!(
        engine.analyze_image(&upload.session_id, PNG_HEADER).await,
        Err(ChartlyError::SessionNotFound { .. })
    ));
    assert!(engine.session_info(&upload.session_id).is_err());
    assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn pie_image_against_forty_cities_is_incompatible() {
    let (engine, classifier) = engine_with("doughnut chart", EngineConfig::default());
    let mut csv = String::from("city,population\n");
    for i in 0..120 {
        csv.push_str(&format!("town{},{}\n", i % 40, 1000 + i * 13));
    }
    let upload = engine.upload_csv(None, csv.as_bytes()).unwrap();
    let result = engine
        .analyze_image(&upload.session_id, PNG_HEADER)
        .await
        .unwrap();
    assert_eq!(result.detected_chart_type, Some(ChartType::Pie));
    assert!(!result.is_compatible);
    assert!(result.error_code.is_none());
    assert!(result.compatibility_reason.contains("40 distinct values"));
    assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unconfigured_classifier_reports_unavailable() {
    let engine = ChartlyEngine::from_config(EngineConfig::default()).unwrap();
    let upload = engine.upload_csv(None, sales_csv().as_bytes()).unwrap();
    let result = engine
        .analyze_image(&upload.session_id, PNG_HEADER)
        .await
        .unwrap();
    assert_eq!(
        result.error_code,
        Some(AnalysisErrorCode::ClassifierUnavailable)
    );
    assert!(!result.is_compatible);
}

#[test]
fn malformed_upload_stores_nothing() {
    let (engine, _) = engine_with("bar", EngineConfig::default());
    for bytes in [&b""[..], &b"a,b\n1,2\n3\n"[..], &b"a,a\n1,2\n"[..]] {
        let err = engine.upload_csv(None, bytes).unwrap_err();
        assert!(matches!(err, ChartlyError::Parse(_)), "unexpected {err:?}");
    }
    assert!(engine.sessions().is_empty());
}
