//! Renders the `pyproject.toml` of a scaffolded artifact project.

use toml_edit::{Array, DocumentMut, InlineTable, Item, Table, Value, value};

use crate::manifest::BuildManifest;

// hatchling above 1.26.3 emits metadata 2.4, which pypiserver 2.3 rejects.
const BUILD_REQUIRES: &str = "hatchling<=1.26.3";
const BUILD_BACKEND: &str = "hatchling.build";
const URL_KINDS: [&str; 3] = ["repository", "documentation", "project"];

const BASE_CLASSIFIERS: [&str; 6] = [
    "Programming Language :: Python",
    "Programming Language :: Python :: 3",
    "Programming Language :: Python :: 3 :: Only",
    "Intended Audience :: Developers",
    "Intended Audience :: Information Technology",
    "Intended Audience :: System Administrators",
];

const TOPIC_CLASSIFIERS: [&str; 2] = [
    "Topic :: Software Development :: Libraries :: Python Modules",
    "Topic :: Scientific/Engineering :: Artificial Intelligence",
];

/// Distribution name published for `manifest` under `username`'s scope.
pub fn project_name(username: &str, manifest: &BuildManifest) -> String {
    format!("{username}.{}", manifest.name.to_lowercase())
}

pub fn render(manifest: &BuildManifest, username: &str) -> String {
    let mut doc = DocumentMut::new();
    let root = doc.as_table_mut();

    let mut build_system = Table::new();
    build_system.insert("requires", value(Array::from_iter([BUILD_REQUIRES])));
    build_system.insert("build-backend", value(BUILD_BACKEND));
    root.insert("build-system", Item::Table(build_system));

    root.insert("project", Item::Table(project_table(manifest, username)));

    let mut wheel = Table::new();
    wheel.insert("packages", value(Array::from_iter(["src/murmur"])));
    let mut targets = implicit_table();
    targets.insert("wheel", Item::Table(wheel));
    let mut build = implicit_table();
    build.insert("targets", Item::Table(targets));
    let mut hatch = implicit_table();
    hatch.insert("build", Item::Table(build));
    let mut tool = implicit_table();
    tool.insert("hatch", Item::Table(hatch));
    root.insert("tool", Item::Table(tool));

    doc.to_string()
}

fn project_table(manifest: &BuildManifest, username: &str) -> Table {
    let metadata = &manifest.metadata;
    let mut project = Table::new();
    project.insert("name", value(project_name(username, manifest)));
    project.insert("version", value(manifest.version.as_str()));
    if let Some(description) = manifest.description.as_deref().filter(|d| !d.is_empty()) {
        project.insert("description", value(description));
    }
    if let Some(requires_python) = metadata.requires_python.as_deref() {
        project.insert("requires-python", value(requires_python));
    }
    if let Some(author) = metadata.author.as_deref() {
        let mut entry = InlineTable::new();
        entry.insert("name", Value::from(author));
        if let Some(email) = metadata.email.as_deref().filter(|e| !e.is_empty()) {
            entry.insert("email", Value::from(email));
        }
        let mut authors = Array::new();
        authors.push(entry);
        project.insert("authors", value(multiline(authors)));
    }
    if let Some(license) = metadata.license.as_deref() {
        let mut table = InlineTable::new();
        table.insert("text", Value::from(license));
        project.insert("license", value(table));
    }

    let mut classifiers: Array = BASE_CLASSIFIERS.iter().copied().collect();
    if let Some(license) = metadata.license.as_deref() {
        classifiers.push(format!("License :: OSI Approved :: {license} License"));
    }
    classifiers.extend(TOPIC_CLASSIFIERS);
    project.insert("classifiers", value(multiline(classifiers)));
    project.insert("readme", value("README.md"));

    let dependencies: Array = manifest.dependencies.iter().map(String::as_str).collect();
    project.insert("dependencies", value(multiline(dependencies)));

    let mut urls = Table::new();
    for kind in URL_KINDS {
        if let Some(url) = metadata.urls.get(kind).and_then(|list| list.first()) {
            urls.insert(&capitalize(kind), value(url.as_str()));
        }
    }
    if !urls.is_empty() {
        project.insert("urls", Item::Table(urls));
    }
    project
}

fn implicit_table() -> Table {
    let mut table = Table::new();
    table.set_implicit(true);
    table
}

/// One element per line, with a trailing comma.
fn multiline(mut array: Array) -> Array {
    if array.is_empty() {
        return array;
    }
    for item in array.iter_mut() {
        item.decor_mut().set_prefix("\n    ");
    }
    array.set_trailing("\n");
    array.set_trailing_comma(true);
    array
}

fn capitalize(raw: &str) -> String {
    let mut chars = raw.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}
