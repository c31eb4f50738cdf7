use pubbatch_pubmed::parser::parse_efetch_xml;

fn load_doc(filename: &str) -> String {
    let dir = std::env::var("BENCH_DATA_DIR")
        .expect("set BENCH_DATA_DIR to directory with sample data files");
    let path = std::path::Path::new(&dir).join(filename);
    std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("{}: {e}", path.display()))
}

#[divan::bench]
fn parse_efetch_xml_bench(bencher: divan::Bencher) {
    // One EFetch response body (PubmedArticleSet, retmode=xml)
    let doc = load_doc("efetch_sample.xml");
    bencher.bench(|| parse_efetch_xml(&doc).unwrap());
}

fn main() {
    divan::main();
}
