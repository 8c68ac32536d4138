//! On-disk fixture project with a client and a server target.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

pub const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

pub const MANIFEST: &str = r#"
[settings]
out_dir = "build"

[[diagnostics.suppress]]
code = "CIRCULAR_DEPENDENCY"
within = "@framework/internal"

[[targets]]
name = "client"
entries = ["src/client.js"]

[targets.output]
dir = "client"

[[targets.transforms]]
name = "url"
options = { source_dir = "src/images", public_path = "/client/" }

[[targets.transforms]]
name = "bundle"

[[targets.transforms]]
name = "minify"
enabled = "!dev"

[[targets]]
name = "server"
environment = "node"
entries = ["src/server.js"]
node_builtins = true

[targets.output]
dir = "server"
file = "index.js"
preserve_entry_signatures = "strict"

[[targets.transforms]]
name = "url"
options = { source_dir = "src/images", public_path = "/client/", emit = false }

[[targets.transforms]]
name = "bundle"
"#;

const FILES: &[(&str, &str)] = &[
    (
        "src/client.js",
        "import { start } from './app.js';\nimport logo from './images/logo.png';\n// boot the app\nstart(logo);\n",
    ),
    (
        "src/server.js",
        "import { render } from './app.js';\nimport logo from './images/logo.png';\nexport function handle() {\n    return render(logo);\n}\n",
    ),
    (
        "src/app.js",
        "import { goto } from '@framework/internal';\n\nexport function start(url) {\n    goto(url);\n}\n\nexport function render(url) {\n    return '<img src=\"' + url + '\">';\n}\n",
    ),
    (
        "node_modules/@framework/internal/package.json",
        r#"{ "name": "@framework/internal", "module": "index.mjs" }"#,
    ),
    (
        "node_modules/@framework/internal/index.mjs",
        "import { navigate } from './router.mjs';\nexport function goto(url) {\n    navigate(url);\n}\n",
    ),
    (
        "node_modules/@framework/internal/router.mjs",
        "import { goto } from './index.mjs';\nexport function navigate(url) {\n    history.pushState({}, '', url);\n}\nexport const back = () => goto(-1);\n",
    ),
];

/// Write the fixture project with `manifest` as its `manifold.toml`.
pub fn project(manifest: &str) -> TempDir {
    let dir = TempDir::new().unwrap();
    for (path, content) in FILES {
        write(dir.path(), path, content.as_bytes());
    }
    write(dir.path(), "src/images/logo.png", PNG);
    write(dir.path(), "manifold.toml", manifest.as_bytes());
    dir
}

pub fn write(root: &Path, path: &str, content: &[u8]) {
    let path = root.join(path);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// Every file below `dir` with extension `ext`.
pub fn files_with_extension(dir: &Path, ext: &str) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let Ok(entries) = fs::read_dir(dir) else {
        return found;
    };
    for entry in entries.filter_map(|entry| entry.ok()) {
        let path = entry.path();
        if path.is_dir() {
            found.extend(files_with_extension(&path, ext));
        } else if path.extension().is_some_and(|e| e == ext) {
            found.push(path);
        }
    }
    found
}
