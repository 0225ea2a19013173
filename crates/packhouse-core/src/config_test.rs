use super::*;

#[test]
fn templated_resolver_substitutes_placeholders() {
    let resolver = TemplatedResolver {
        repo_path: "/srv/archives/{name}".into(),
        repo_url: "https://archive.example/{name}".into(),
        files_path: "/srv/files/{name}/{id}".into(),
        files_url: "https://files.example/{name}/{id}".into(),
    };
    let resolved = resolver.resolve("default", 7);
    assert_eq!(resolved.repo_path, PathBuf::from("/srv/archives/default"));
    assert_eq!(resolved.files_path, PathBuf::from("/srv/files/default/7"));
    assert_eq!(resolved.files_url, "https://files.example/default/7");
}

#[test]
fn discover_prefers_explicit_path() {
    let explicit = PathBuf::from("/tmp/does-not-need-to-exist.yaml");
    let found = Config::discover(Some(&explicit)).unwrap();
    assert_eq!(found, explicit);
}

#[test]
fn discover_fails_loudly_when_nothing_is_found() {
    // SAFETY: test-only, no other thread in this process reads HOME
    // concurrently with this assertion.
    unsafe {
        std::env::remove_var("HOME");
    }
    let err = Config::discover(None).unwrap_err();
    assert!(err.to_string().contains("no packhouse configuration file"));
}
