use anyhow::Result;
use std::fs;
use std::path::Path;
use tabload::app::{LoadUseCase, VerifyReport, VerifyUseCase};
use tabload::config::{DestinationConfig, LoadPlan, WriteMode};
use tabload::error::{LoaderError, Stage};
use tabload::infra::memory_graph::MemoryGraph;
use tabload::infra::sqlite_store::{ForeignKey, SqliteStore};
use tabload::pipeline::persist::{read_back_graph, read_back_relational, table_spec};
use tabload::rdf::Term;
use tabload::types::Value;
use tempfile::tempdir;

const VENUES: &str = "id,name,type
1531-6912,Comparative And Functional Genomics,journal
1367-5931,Current Opinion In Chemical Biology,journal
9780470291092,Proceedings Of The 5th Annual Conference,book
";

const PUBLICATIONS: &str = "id,title,type,publication year,issue,volume,publication venue
doi:10.1002/cfg.304,Development Of Computational Tools,journal-article,2003,4,4,1531-6912
doi:10.1016/s1367-5931(02)00332-0,In Vitro Selection,journal-article,2002,,6,1367-5931
doi:10.1002/9780470291092.ch20,Mechanisms Of Toughening,book-chapter,1981,,,9780470291092
";

const SOURCES: &str = r#"
[[sources]]
name = "venue"
path = "venues.csv"
id_prefix = "venue"
key = "id"
table = "Venue"
columns = [{ name = "id" }, { name = "name" }, { name = "type" }]

[sources.graph]
type_column = "type"
classes = { journal = "https://schema.org/Periodical", book = "https://schema.org/Book" }
predicates = { id = "https://schema.org/identifier", name = "https://schema.org/name" }

[[sources]]
name = "publication"
path = "publications.csv"
id_prefix = "publication"
key = "id"
table = "Publication"
columns = [{ name = "id" }, { name = "publication year", type = "integer" }, { name = "publication venue" }]
foreign_keys = [{ column = "publication venue", references = "venue" }]

[sources.graph]
type_column = "type"
classes = { "journal-article" = "https://schema.org/ScholarlyArticle" }
predicates = { id = "https://schema.org/identifier", title = "https://schema.org/name", issue = "https://schema.org/issueNumber" }
relations = { venue_internal_id = "https://schema.org/isPartOf" }

[[joins]]
left = "publication"
right = "venue"
left_key = "publication venue"
right_key = "id"
carry = ["internal_id"]
"#;

const SQLITE_DEST: &str = r#"
[destination]
kind = "sqlite"
path = "out/publications.db"
"#;

const SPARQL_DEST: &str = r#"
[destination]
kind = "sparql"
endpoint = "http://127.0.0.1:9/sparql"
base_uri = "https://comp-data.github.io/res/"
vocab_uri = "https://schema.org/"
batch_size = 4
"#;

fn write_plan(dir: &Path, destination: &str, venues: &str) -> Result<LoadPlan> {
    fs::write(dir.join("venues.csv"), venues)?;
    fs::write(dir.join("publications.csv"), PUBLICATIONS)?;
    let plan_path = dir.join("load_plan.toml");
    fs::write(&plan_path, format!("{}\n{}", destination, SOURCES))?;
    Ok(LoadPlan::from_path(&plan_path)?)
}

#[tokio::test]
async fn sqlite_load_yields_resolvable_foreign_keys() -> Result<()> {
    let dir = tempdir()?;
    let plan = write_plan(dir.path(), SQLITE_DEST, VENUES)?;
    let use_case = LoadUseCase::new(plan)?;

    let report = use_case.run().await?;
    assert_eq!(report.sets.len(), 2);
    assert_eq!(report.sets[0].target, "Venue");
    assert_eq!(report.sets[1].rows, 3);

    let store = SqliteStore::open(dir.path().join("out/publications.db"))?;
    assert_eq!(store.row_count("Venue")?, 3);
    assert_eq!(store.row_count("Publication")?, 3);
    let fk = ForeignKey {
        column: "publication venue".into(),
        table: "Venue".into(),
        key: "id".into(),
    };
    assert_eq!(store.dangling_references("Publication", &fk)?, 0);

    // every publication carries a venue reference and the venue's synthetic id
    let sets = use_case.prepare()?;
    let publications = &sets[1];
    let spec = table_spec(publications, "Publication", "id", vec![fk])?;
    let back = read_back_relational(&store, &spec)?;
    assert_eq!(back, publications.records);
    for record in &back {
        assert!(record.contains("publication venue"));
        assert!(record.contains("venue_internal_id"));
    }
    // empty issue stays absent
    assert!(!back[1].contains("issue"));
    assert_eq!(back[0].get("publication year"), Some(&Value::Integer(2003)));
    store.close()?;
    Ok(())
}

#[tokio::test]
async fn identifiers_are_stable_across_runs() -> Result<()> {
    let dir = tempdir()?;
    let plan = write_plan(dir.path(), SQLITE_DEST, VENUES)?;
    let use_case = LoadUseCase::new(plan)?;
    let first = use_case.prepare()?;
    let second = use_case.prepare()?;
    assert_eq!(first, second);
    assert_eq!(
        first[0].records[2].get("internal_id"),
        Some(&Value::from("venue-2"))
    );
    assert_eq!(
        first[1].records[2].get("venue_internal_id"),
        Some(&Value::from("venue-2"))
    );
    Ok(())
}

#[tokio::test]
async fn graph_load_skips_absent_values_and_round_trips() -> Result<()> {
    let dir = tempdir()?;
    let plan = write_plan(dir.path(), SPARQL_DEST, VENUES)?;
    let use_case = LoadUseCase::new(plan)?;
    let graph = MemoryGraph::new();

    let report = use_case.run_with_graph_store(&graph).await?;
    assert_eq!(report.sets[1].rows, 3);
    assert_eq!(report.sets.iter().map(|s| s.statements).sum::<usize>(), graph.len());

    let base = "https://comp-data.github.io/res/";
    let triples = graph.triples();
    let issue_subjects: Vec<_> = triples
        .iter()
        .filter(|t| t.predicate == "https://schema.org/issueNumber")
        .map(|t| t.subject.clone())
        .collect();
    assert_eq!(issue_subjects, vec![format!("{}publication-0", base)]);

    let part_of = triples
        .iter()
        .find(|t| {
            t.subject == format!("{}publication-1", base) && t.predicate == "https://schema.org/isPartOf"
        })
        .expect("isPartOf statement");
    assert_eq!(part_of.object, Term::iri(format!("{}venue-1", base)));

    let sets = use_case.prepare()?;
    for (source, set) in use_case.plan().sources.iter().zip(&sets) {
        let mapping = use_case.graph_mapping(source).expect("graph destination");
        let back = read_back_graph(set, &mapping, &graph).await?;
        assert_eq!(back, set.records);
    }

    let verify = VerifyUseCase::new(use_case.plan().clone())?;
    match verify.run_with_graph_store(&graph).await? {
        VerifyReport::Graph(counts) => {
            let journals = counts
                .iter()
                .find(|(c, _)| c == "https://schema.org/Periodical")
                .map(|(_, n)| *n);
            assert_eq!(journals, Some(2));
        }
        other => panic!("unexpected report {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn missing_source_fails_in_load_stage() -> Result<()> {
    let dir = tempdir()?;
    let mut plan = write_plan(dir.path(), SQLITE_DEST, VENUES)?;
    plan.sources[0].path = dir.path().join("nope.csv");
    let err = LoadUseCase::new(plan)?.run().await.unwrap_err();
    assert_eq!(err.stage, Stage::Load);
    assert!(matches!(err.source, LoaderError::SourceNotFound { .. }));
    Ok(())
}

#[tokio::test]
async fn duplicate_venue_fails_in_join_stage() -> Result<()> {
    let dir = tempdir()?;
    let duplicated = format!("{}1531-6912,Duplicate Genomics,journal\n", VENUES);
    let plan = write_plan(dir.path(), SQLITE_DEST, &duplicated)?;
    let err = LoadUseCase::new(plan)?.run().await.unwrap_err();
    assert_eq!(err.stage, Stage::Join);
    assert!(matches!(err.source, LoaderError::AmbiguousJoin { count: 2, .. }));
    // nothing was persisted
    assert!(!dir.path().join("out/publications.db").exists());
    Ok(())
}

#[tokio::test]
async fn existing_identifier_column_fails_in_identify_stage() -> Result<()> {
    let dir = tempdir()?;
    let venues = "id,name,type,internal_id\n1531-6912,Genomics,journal,ORIG-A\n";
    let plan = write_plan(dir.path(), SQLITE_DEST, venues)?;
    let err = LoadUseCase::new(plan)?.prepare().unwrap_err();
    assert_eq!(err.stage, Stage::Identify);
    assert!(matches!(err.source, LoaderError::SchemaMismatch { .. }));
    Ok(())
}

#[tokio::test]
async fn venue_without_key_fails_in_persist_stage() -> Result<()> {
    let dir = tempdir()?;
    let venues = format!("{},Nameless Venue,journal\n", VENUES);
    let plan = write_plan(dir.path(), SQLITE_DEST, &venues)?;
    let err = LoadUseCase::new(plan)?.run().await.unwrap_err();
    assert_eq!(err.stage, Stage::Persist);
    match err.source {
        LoaderError::SchemaMismatch { set, detail } => {
            assert_eq!(set, "venue");
            assert!(detail.contains("row 3"), "{}", detail);
        }
        other => panic!("unexpected error {:?}", other),
    }

    let store = SqliteStore::open(dir.path().join("out/publications.db"))?;
    assert_eq!(store.table_columns("Venue")?, None);
    store.close()?;
    Ok(())
}

#[tokio::test]
async fn append_with_different_columns_fails_in_persist_stage() -> Result<()> {
    let dir = tempdir()?;
    let mut plan = write_plan(dir.path(), SQLITE_DEST, VENUES)?;
    LoadUseCase::new(plan.clone())?.run().await?;

    fs::write(dir.path().join("venues.csv"), "id,name,type,issn\nX,Other,journal,1234\n")?;
    if let DestinationConfig::Sqlite { mode, .. } = &mut plan.destination {
        *mode = WriteMode::Append;
    }
    plan.joins.clear();
    let err = LoadUseCase::new(plan)?.run().await.unwrap_err();
    assert_eq!(err.stage, Stage::Persist);
    assert!(matches!(err.source, LoaderError::SchemaConflict { .. }));
    Ok(())
}

#[tokio::test]
async fn verify_reports_tables() -> Result<()> {
    let dir = tempdir()?;
    let plan = write_plan(dir.path(), SQLITE_DEST, VENUES)?;
    LoadUseCase::new(plan.clone())?.run().await?;

    match VerifyUseCase::new(plan)?.run(2).await? {
        VerifyReport::Relational(tables) => {
            assert_eq!(tables.len(), 2);
            assert_eq!(tables[1].table, "Publication");
            assert_eq!(tables[1].rows, 3);
            assert_eq!(tables[1].sample.len(), 2);
            assert!(tables[1].dangling.is_empty());
        }
        other => panic!("unexpected report {:?}", other),
    }
    Ok(())
}
