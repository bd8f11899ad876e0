use boc_core::features::bag_of_concepts;
use boc_core::persist::DataSource;
use boc_core::store::{ConceptCorpusBuilder, ConceptStore, MemoryConceptStore, PageSource, SledConceptStore};
use boc_core::{ConceptRanker, CorpusConfig, FeatureConfig, RankerConfig, Tokenizer};
use std::fs;
use tempfile::tempdir;

fn page(name: &str, text: &str, links: &[&str]) -> PageSource {
    PageSource {
        name: name.to_string(),
        text: text.to_string(),
        links: Some(links.iter().map(|l| l.to_string()).collect()),
    }
}

fn corpus() -> MemoryConceptStore {
    let config = CorpusConfig { min_page_length: 1, min_term_total: 1, ..CorpusConfig::default() };
    let mut builder = ConceptCorpusBuilder::new(config, Tokenizer::plain());
    let pages = [
        page(
            "Python (programming language)",
            "python code interpreter python script code",
            &["Guido van Rossum"],
        ),
        page("Snake", "python snake reptile scales venom snake", &[]),
        page("Coffee", "coffee bean roast espresso", &[]),
        page("Guido van Rossum", "python creator guido programmer dutch", &["Python (programming language)"]),
        page("Tea", "tea leaf brew", &[]),
    ];
    for p in &pages {
        assert!(builder.add_source(p).is_some());
    }
    builder.build()
}

fn config() -> RankerConfig {
    RankerConfig { min_tfidf: 0.0, min_counter: 0, ..RankerConfig::default() }
}

fn names(store: &MemoryConceptStore, text: &str) -> Vec<String> {
    let ranker = ConceptRanker::new(store, Tokenizer::plain(), config());
    let found = ranker.word_concepts(text, None).unwrap().unwrap();
    found.results.into_iter().map(|r| r.page_name).collect()
}

#[test]
fn ranks_best_matching_concept_first() {
    let store = corpus();
    let ranker = ConceptRanker::new(&store, Tokenizer::plain(), config());
    let found = ranker.word_concepts("python code", None).unwrap().unwrap();

    assert_eq!(found.terms, vec!["code", "python"]);
    assert_eq!(found.query_vector.len(), 2);
    assert!(found.query_vector[0] > found.query_vector[1]);

    let result_names: Vec<&str> = found.results.iter().map(|r| r.page_name.as_str()).collect();
    assert_eq!(result_names, vec!["Python (programming language)", "Guido van Rossum", "Snake"]);
    for pair in found.results.windows(2) {
        assert!(pair[0].weight >= pair[1].weight);
    }
    for r in &found.results {
        assert!(r.weight.is_finite());
        assert!(r.incoming.is_some());
        assert_eq!(r.vector.len(), 2);
    }
    let python = &found.results[0];
    assert_eq!(python.incoming, Some(1.0));
    assert_eq!(python.outgoing, Some(1.0));
}

#[test]
fn empty_or_stopword_text_has_no_concepts() {
    let store = corpus();
    let ranker = ConceptRanker::new(&store, Tokenizer::plain(), config());
    assert!(ranker.word_concepts("", None).unwrap().is_none());
    assert!(ranker.word_concepts("the and of", None).unwrap().is_none());
}

#[test]
fn unknown_terms_give_empty_results() {
    let store = corpus();
    let ranker = ConceptRanker::new(&store, Tokenizer::plain(), config());
    let found = ranker.word_concepts("zebra quantum", None).unwrap().unwrap();
    assert!(found.results.is_empty());
    assert!(found.terms.is_empty());
}

#[test]
fn title_terms_are_boosted() {
    let store = corpus();
    let ranker = ConceptRanker::new(&store, Tokenizer::plain(), config());
    let plain = ranker.word_concepts("python code", None).unwrap().unwrap();
    let titled = ranker.word_concepts("python code", Some("python")).unwrap().unwrap();
    let ratio = |m: &boc_core::ConceptMatch| m.query_vector[1] / m.query_vector[0];
    assert!(ratio(&titled) > ratio(&plain));
}

#[test]
fn high_threshold_filters_every_term() {
    let store = corpus();
    let cfg = RankerConfig { min_tfidf: 100.0, ..config() };
    let ranker = ConceptRanker::new(&store, Tokenizer::plain(), cfg);
    let found = ranker.word_concepts("python code", None).unwrap().unwrap();
    assert!(found.results.is_empty());
}

#[test]
fn sled_backend_ranks_like_memory() {
    let store = corpus();
    let dir = tempdir().unwrap();
    let sled = SledConceptStore::import(dir.path().join("concepts"), &store).unwrap();
    assert_eq!(sled.corpus_size().unwrap(), 5);

    let ranker = ConceptRanker::new(&sled, sled.tokenizer().unwrap(), config());
    let found = ranker.word_concepts("python code", None).unwrap().unwrap();
    let from_sled: Vec<String> = found.results.into_iter().map(|r| r.page_name).collect();
    assert_eq!(from_sled, names(&store, "python code"));
}

#[test]
fn bag_of_concepts_marks_labelled_rows() {
    let store = corpus();
    let ranker = ConceptRanker::new(&store, Tokenizer::plain(), config());
    let dir = tempdir().unwrap();
    let a = dir.path().join("a.txt");
    let b = dir.path().join("b.txt");
    fs::write(&a, "python code").unwrap();
    fs::write(&b, "coffee espresso").unwrap();
    let unknown = dir.path().join("c.txt");
    fs::write(&unknown, "zebra quantum").unwrap();
    let bad = dir.path().join("d.txt");
    fs::write(&bad, [0xc3, 0x28, b' ', b'x']).unwrap();

    let mut data = DataSource::new();
    data.insert(a.clone(), Some("python".into()));
    data.insert(b.clone(), None);
    data.insert(dir.path().join("missing.txt"), None);
    data.insert(unknown, Some("python".into()));
    data.insert(bad, Some("python".into()));

    let cfg = FeatureConfig { n_concepts: 2, min_text_length: 0, ..FeatureConfig::default() };
    let features = bag_of_concepts(&data, &ranker, &cfg).unwrap();
    assert_eq!(features.rows, vec![a.display().to_string(), b.display().to_string()]);
    assert_eq!(features.labels.to_vec(), vec![1.0, 0.0]);
    assert_eq!(features.columns.len(), 3);
    let ids: Vec<u32> = features.columns.iter().map(|c| c.parse().unwrap()).collect();
    assert!(ids.windows(2).all(|w| w[0] < w[1]));
    assert!(features.matrix.iter().all(|v| *v >= 0.0));
    assert_eq!(features.matrix.row(0).iter().filter(|v| **v > 0.0).count(), 2);
    assert_eq!(features.matrix.row(1).iter().filter(|v| **v > 0.0).count(), 1);

    let short = FeatureConfig { min_text_length: 12, ..cfg };
    let features = bag_of_concepts(&data, &ranker, &short).unwrap();
    assert_eq!(features.rows, vec![b.display().to_string()]);
}
