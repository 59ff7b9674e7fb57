//! Integration tests for NsDiscovery.
//!
//! These tests run whole discovery passes over the fixture working copy
//! against an in-memory or mocked HTTP catalogue, and drive the binary.

use nsdiscovery::catalogue::{CatalogueCall, Collection, InMemoryCatalogue};
use nsdiscovery::git::LocalCheckout;
use nsdiscovery::notify::LogAlertSink;
use nsdiscovery::parser::{HclModuleParser, SharedParser};
use nsdiscovery::{Config, Discovery, JobStatus, NamespaceOutcome};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Root of the fixture working copy.
fn checkout_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/environments")
}

fn seeded_catalogue() -> Arc<InMemoryCatalogue> {
    let catalogue = Arc::new(InMemoryCatalogue::new());
    catalogue.insert(
        Collection::Components,
        json!({
            "name": "visits-ui",
            "environments": [
                {"name": "dev", "namespace": "visits-dev"},
                {"name": "prod", "namespace": "visits-prod"}
            ]
        }),
    );
    catalogue.insert(
        Collection::Components,
        json!({
            "name": "visits-api",
            "environments": [{"name": "dev", "namespace": "visits-dev"}]
        }),
    );
    catalogue.insert(
        Collection::Components,
        json!({
            "name": "prison-api",
            "environments": [{"name": "dev", "namespace": "prison-api-dev"}, {"name": "preprod"}]
        }),
    );
    catalogue.insert(Collection::Namespaces, json!({"name": "retired-namespace"}));
    catalogue.insert(Collection::ScheduledJobs, json!({"name": "hmpps-terraform-discovery"}));
    catalogue
}

fn discovery_with(config: Config, catalogue: Arc<InMemoryCatalogue>) -> Discovery {
    let parser = SharedParser::new(HclModuleParser::new(&config));
    Discovery::new(
        config,
        catalogue,
        Box::new(LocalCheckout::new(checkout_path())),
        Box::new(LogAlertSink),
        parser,
    )
}

fn discovery(catalogue: Arc<InMemoryCatalogue>) -> Discovery {
    let mut config = Config::default();
    config.discovery.max_workers = 2;
    discovery_with(config, catalogue)
}

fn namespace(catalogue: &InMemoryCatalogue, name: &str) -> Value {
    let entry = catalogue
        .records(Collection::Namespaces)
        .into_iter()
        .find(|e| e.name() == Some(name))
        .unwrap_or_else(|| panic!("namespace {name} not in catalogue"));
    Value::Object(entry.attributes)
}

/// Namespace update payloads among the recorded calls in `range`, keyed by name.
fn namespace_updates(catalogue: &InMemoryCatalogue, range: std::ops::Range<usize>) -> BTreeMap<String, String> {
    catalogue.calls()[range]
        .iter()
        .filter_map(|call| match call {
            CatalogueCall::Update {
                collection: Collection::Namespaces,
                data,
                ..
            } => Some((
                data["name"].as_str().unwrap_or_default().to_string(),
                serde_json::to_string(data).unwrap(),
            )),
            _ => None,
        })
        .collect()
}

mod discovery_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_full_run_creates_namespace_records() {
        let catalogue = seeded_catalogue();
        let summary = discovery(Arc::clone(&catalogue)).run().await.unwrap();

        assert_eq!(summary.status, JobStatus::Succeeded, "errors: {:?}", summary.errors);
        assert_eq!(summary.batch.components.len(), 3);
        assert_eq!(summary.batch.count(NamespaceOutcome::Created), 3);
        assert_eq!(summary.batch.count(NamespaceOutcome::Skipped), 1);
        assert_eq!(
            catalogue.names(Collection::Namespaces),
            vec!["prison-api-dev", "visits-dev", "visits-prod"]
        );
    }

    #[tokio::test]
    async fn test_extracted_records_match_terraform() {
        let catalogue = seeded_catalogue();
        discovery(Arc::clone(&catalogue)).run().await.unwrap();

        let dev = namespace(&catalogue, "visits-dev");
        let rds = &dev["rds_instance"][0];
        assert_eq!(dev["rds_instance"].as_array().unwrap().len(), 1);
        assert_eq!(rds["tf_label"], json!("visits_rds"));
        assert_eq!(rds["tf_filename"], json!("rds.tf"));
        assert_eq!(rds["tf_path"], json!("module.visits_rds"));
        assert_eq!(rds["tf_line_start"], json!(1));
        assert_eq!(rds["tf_mod_version"], json!("8.0.1"));
        assert_eq!(rds["db_max_allocated_storage"], json!("500"));
        assert_eq!(rds["namespace"], json!("visits-dev"));
        assert_eq!(rds["application"], json!("Visits booking"));
        assert_eq!(rds["is_production"], json!("false"));
        assert!(rds.get("vpc_name").is_none());

        let cache = &dev["elasticache_cluster"][0];
        assert_eq!(cache["tf_mod_version"], json!("6.2.0"));
        assert_eq!(cache["parameter_group_name"], json!("visits"));
        assert_eq!(cache["number_cache_clusters"], json!(2));

        let checks = dev["pingdom_check"].as_array().unwrap();
        assert_eq!(checks.len(), 1);
        assert_eq!(checks[0]["tf_path"], json!("pingdom_check.visits-health"));
        assert_eq!(checks[0]["host"], json!("visits-dev.hmpps.service.justice.gov.uk"));
        assert_eq!(checks[0]["integrationids"], json!([12345]));

        let prod = namespace(&catalogue, "visits-prod");
        let template = &prod["hmpps_template"][0];
        assert_eq!(template["tf_mod_version"], json!("1.4.0"));
        assert_eq!(template["github_repo"], json!("hmpps-visits-ui"));
        assert_eq!(template["reviewer_teams"], json!(["visits-leads"]));
        assert_eq!(prod["rds_instance"], json!([]));
    }

    #[tokio::test]
    async fn test_namespace_without_resources_gets_empty_record() {
        let catalogue = seeded_catalogue();
        discovery(Arc::clone(&catalogue)).run().await.unwrap();

        let record = namespace(&catalogue, "prison-api-dev");
        assert_eq!(record["rds_instance"], json!([]));
        assert_eq!(record["elasticache_cluster"], json!([]));
        assert_eq!(record["hmpps_template"], json!([]));
        assert_eq!(record["pingdom_check"], json!([]));
    }

    #[tokio::test]
    async fn test_repeated_runs_send_identical_updates() {
        let catalogue = seeded_catalogue();
        let discovery = discovery(Arc::clone(&catalogue));

        discovery.run().await.unwrap();
        let before_second = catalogue.calls().len();
        let second = discovery.run().await.unwrap();
        let before_third = catalogue.calls().len();
        let third = discovery.run().await.unwrap();
        let after_third = catalogue.calls().len();

        assert_eq!(second.batch.count(NamespaceOutcome::Updated), 3);
        assert_eq!(third.batch.count(NamespaceOutcome::Updated), 3);

        let second_updates = namespace_updates(&catalogue, before_second..before_third);
        let third_updates = namespace_updates(&catalogue, before_third..after_third);
        assert_eq!(second_updates.len(), 3);
        assert_eq!(second_updates, third_updates);

        // sub-record ids are carried over instead of recreated
        let dev: Value = serde_json::from_str(&second_updates["visits-dev"]).unwrap();
        assert!(dev["rds_instance"][0].get("id").is_some());
        assert!(dev["pingdom_check"][0].get("id").is_some());
    }

    #[tokio::test]
    async fn test_sweep_removes_only_orphans() {
        let catalogue = seeded_catalogue();
        let summary = discovery(Arc::clone(&catalogue)).run().await.unwrap();

        let sweep = summary.sweep.unwrap();
        assert_eq!(sweep.deleted, vec!["retired-namespace"]);
        assert!(sweep.failed.is_empty());
        assert!(!catalogue.names(Collection::Namespaces).contains(&"retired-namespace".to_string()));
    }

    #[tokio::test]
    async fn test_sweep_can_be_disabled() {
        let catalogue = seeded_catalogue();
        let mut config = Config::default();
        config.discovery.sweep = false;

        let summary = discovery_with(config, Arc::clone(&catalogue)).run().await.unwrap();
        assert!(summary.sweep.is_none());
        assert!(catalogue.names(Collection::Namespaces).contains(&"retired-namespace".to_string()));
    }

    #[tokio::test]
    async fn test_failed_namespace_does_not_stop_the_batch() {
        let catalogue = seeded_catalogue();
        catalogue.fail_writes_for("visits-prod");

        let summary = discovery(Arc::clone(&catalogue)).run().await.unwrap();

        assert_eq!(summary.status, JobStatus::CompletedWithErrors);
        assert_eq!(summary.errors.len(), 1);
        assert!(summary.errors[0].starts_with("visits-ui/visits-prod: "));
        assert_eq!(summary.batch.count(NamespaceOutcome::Created), 2);

        let job = &catalogue.records(Collection::ScheduledJobs)[0];
        assert_eq!(job.get("result"), Some(&json!("Completed with errors")));
        assert!(job.get("last_successful_run").is_none());
    }

    #[tokio::test]
    async fn test_successful_run_records_job_status() {
        let catalogue = seeded_catalogue();
        discovery(Arc::clone(&catalogue)).run().await.unwrap();

        let job = &catalogue.records(Collection::ScheduledJobs)[0];
        assert_eq!(job.get("result"), Some(&json!("Succeeded")));
        assert!(job.get("last_successful_run").is_some());
        assert_eq!(job.get("error_details"), Some(&json!([])));
    }

    #[tokio::test]
    async fn test_unreachable_catalogue_is_fatal() {
        let catalogue = seeded_catalogue();
        catalogue.set_unreachable(true);

        let err = discovery(Arc::clone(&catalogue)).run().await.unwrap_err();
        assert_eq!(err.exit_code(), 22);

        let writes = catalogue
            .calls()
            .iter()
            .filter(|c| matches!(c, CatalogueCall::Create { .. } | CatalogueCall::Delete { .. }))
            .count();
        assert_eq!(writes, 0);
    }

    #[tokio::test]
    async fn test_missing_checkout_is_fatal() {
        let catalogue = seeded_catalogue();
        let config = Config::default();
        let parser = SharedParser::new(HclModuleParser::new(&config));
        let discovery = Discovery::new(
            config,
            catalogue.clone(),
            Box::new(LocalCheckout::new(checkout_path().join("does-not-exist"))),
            Box::new(LogAlertSink),
            parser,
        );

        let err = discovery.run().await.unwrap_err();
        assert_eq!(err.exit_code(), 17);
        assert_eq!(catalogue.names(Collection::Namespaces), vec!["retired-namespace"]);
    }
}

mod parser_tests {
    use super::*;
    use nsdiscovery::parser::ModuleParser;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_fixture_namespace() {
        let config = Config::default();
        let mut parser = HclModuleParser::new(&config);
        let dir = checkout_path()
            .join("namespaces/live.cloud-platform.service.justice.gov.uk/visits-dev/resources");

        let result = parser.parse_dir(&dir).unwrap();
        assert_eq!(result.modules.len(), 2);
        assert_eq!(result.collection("pingdom_check").unwrap().len(), 2);
        assert_eq!(result.collection("kubernetes_secret").unwrap().len(), 1);
        assert_eq!(result.collection("aws_elasticache_parameter_group").unwrap().len(), 1);
        assert!(result.collection("aws").is_none());
    }

    #[test]
    fn test_excluded_files_are_not_parsed() {
        let mut config = Config::default();
        config.discovery.exclude_patterns = vec!["pingdom*.tf".to_string()];
        let mut parser = HclModuleParser::new(&config);
        let dir = checkout_path()
            .join("namespaces/live.cloud-platform.service.justice.gov.uk/visits-dev/resources");

        let result = parser.parse_dir(&dir).unwrap();
        assert!(result.collection("pingdom_check").is_none());
        assert_eq!(result.modules.len(), 2);
    }
}

mod http_catalogue_tests {
    use super::*;
    use nsdiscovery::catalogue::{HttpCatalogue, RetryPolicy};
    use nsdiscovery::config::CatalogueOptions;
    use wiremock::{matchers::*, Mock, MockServer, ResponseTemplate};

    fn list(data: Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "data": data,
            "meta": {"pagination": {"page": 1, "pageSize": 100, "pageCount": 1, "total": 1}}
        }))
    }

    #[tokio::test]
    async fn test_run_against_http_catalogue() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/_health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/components"))
            .and(query_param("populate", "environments"))
            .respond_with(list(json!([{
                "id": 1,
                "attributes": {
                    "name": "visits-ui",
                    "environments": [{"id": 11, "name": "prod", "namespace": "visits-prod"}]
                }
            }])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/namespaces"))
            .and(query_param("filters[name][$eq]", "visits-prod"))
            .respond_with(list(json!([])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/namespaces"))
            .and(body_partial_json(json!({"data": {"name": "visits-prod"}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"id": 7, "attributes": {}}})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/scheduled-jobs"))
            .respond_with(list(json!([{"id": 3, "attributes": {"name": "hmpps-terraform-discovery"}}])))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/v1/scheduled-jobs/3"))
            .and(body_partial_json(json!({"data": {"result": "Succeeded"}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"id": 3}})))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = Config::default();
        config.discovery.sweep = false;
        config.catalogue = CatalogueOptions {
            url: Some(server.uri()),
            ..CatalogueOptions::default()
        };
        let catalogue = HttpCatalogue::new(&config.catalogue).unwrap().with_retry_policy(RetryPolicy {
            max_retries: 0,
            delay_ms: 1,
            backoff_multiplier: 1.0,
        });
        let parser = SharedParser::new(HclModuleParser::new(&config));
        let discovery = Discovery::new(
            config,
            Arc::new(catalogue),
            Box::new(LocalCheckout::new(checkout_path())),
            Box::new(LogAlertSink),
            parser,
        );

        let summary = discovery.run().await.unwrap();
        assert_eq!(summary.status, JobStatus::Succeeded, "errors: {:?}", summary.errors);
        assert_eq!(summary.batch.count(NamespaceOutcome::Created), 1);
    }
}

mod cli_tests {
    use super::*;
    use assert_cmd::Command;
    use predicates::prelude::*;

    fn nsdiscovery(dir: &std::path::Path) -> Command {
        let mut cmd = Command::cargo_bin("nsdiscovery").unwrap();
        cmd.current_dir(dir)
            .env_remove("NSDISCOVERY_CONFIG")
            .env_remove("SERVICE_CATALOGUE_API_ENDPOINT")
            .env_remove("SERVICE_CATALOGUE_API_KEY")
            .env_remove("SLACK_BOT_TOKEN")
            .env_remove("RUST_LOG");
        cmd
    }

    #[test]
    fn test_help_lists_commands() {
        let dir = tempfile::tempdir().unwrap();
        nsdiscovery(dir.path())
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("run"))
            .stdout(predicate::str::contains("validate"));
    }

    #[test]
    fn test_init_writes_example_and_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        nsdiscovery(dir.path())
            .arg("init")
            .assert()
            .success()
            .stdout(predicate::str::contains("nsdiscovery.yaml"));
        assert!(dir.path().join("nsdiscovery.yaml").is_file());

        nsdiscovery(dir.path())
            .arg("init")
            .assert()
            .failure()
            .stderr(predicate::str::contains("already exists"));

        nsdiscovery(dir.path()).args(["init", "--force"]).assert().success();
    }

    #[test]
    fn test_validate_example_with_environment() {
        let dir = tempfile::tempdir().unwrap();
        nsdiscovery(dir.path()).arg("init").assert().success();

        nsdiscovery(dir.path())
            .env("SERVICE_CATALOGUE_API_ENDPOINT", "https://catalogue.example.com")
            .env("SERVICE_CATALOGUE_API_KEY", "key")
            .arg("validate")
            .assert()
            .success()
            .stdout(predicate::str::contains("Configuration is valid"));
    }

    #[test]
    fn test_validate_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("bad.yaml");
        std::fs::write(&file, "discovery:\n  max_workers: 0\n").unwrap();

        nsdiscovery(dir.path())
            .args(["validate", "bad.yaml"])
            .assert()
            .code(1)
            .stderr(predicate::str::contains("discovery.max_workers"));
    }

    #[test]
    fn test_run_without_catalogue_url() {
        let dir = tempfile::tempdir().unwrap();
        nsdiscovery(dir.path())
            .args(["run", "--local", "--checkout-dir"])
            .arg(checkout_path())
            .assert()
            .code(20)
            .stderr(predicate::str::contains("catalogue"));
    }

    #[test]
    fn test_run_with_unreachable_catalogue() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("nsdiscovery.yaml"),
            "catalogue:\n  url: http://127.0.0.1:9\n  max_retries: 0\n  timeout_secs: 2\n",
        )
        .unwrap();

        nsdiscovery(dir.path())
            .args(["run", "--local", "--checkout-dir"])
            .arg(checkout_path())
            .assert()
            .code(22)
            .stderr(predicate::str::contains("Terraform Discovery failed"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_run_prints_summary() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/_health"))
            .respond_with(wiremock::ResponseTemplate::new(200))
            .mount(&server)
            .await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(json!({"data": []})))
            .mount(&server)
            .await;

        let uri = server.uri();
        let output = tokio::task::spawn_blocking(move || {
            let dir = tempfile::tempdir().unwrap();
            nsdiscovery(dir.path())
                .env("SERVICE_CATALOGUE_API_ENDPOINT", uri)
                .args(["run", "--local", "--skip-sweep", "--checkout-dir"])
                .arg(checkout_path())
                .output()
                .unwrap()
        })
        .await
        .unwrap();

        assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("Status: Succeeded"));
        assert!(stdout.contains("Sweep: disabled"));
    }
}
