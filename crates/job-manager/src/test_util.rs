use std::path::Path;

use once_cell::sync::Lazy;

use crate::ArtifactLayout;

pub static TRACING: Lazy<()> = Lazy::new(|| {
    if std::env::var("TEST_LOG").is_ok() {
        configure_tracing();
    }
});

fn configure_tracing() {
    use tracing_subscriber::layer::SubscriberExt;
    let tree = tracing_tree::HierarchicalLayer::new(2)
        .with_targets(true)
        .with_bracketed_fields(true);

    let subscriber = tracing_subscriber::Registry::default()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tree);

    tracing::subscriber::set_global_default(subscriber).unwrap();
}

pub fn setup_test_tracing() {
    Lazy::force(&TRACING);
}

/// Write every artifact in `layout` into `dir`, the way a separator lays out its output.
pub fn write_artifacts(dir: &Path, layout: &ArtifactLayout) {
    std::fs::create_dir_all(dir).expect("creating artifact directory");
    for name in &layout.names {
        std::fs::write(dir.join(layout.file_name(name)), format!("{name} stem"))
            .expect("writing artifact");
    }
}
