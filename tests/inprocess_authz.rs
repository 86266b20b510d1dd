use std::sync::Arc;

use endpoint_guard::services::authz::{Authorizer, InProcessAuthorizer};
use endpoint_guard::services::policy::{self, PolicyError};
use serde_json::{Value, json};

const POLICY: &str = r#"
package http.authz

import input.request

default allow := false

# Reads are open to any authenticated caller.
allow if {
    input.request.method == "GET"
    input.claims.sub != ""
}

allow if {
    is_admin
    not blocked
}

is_admin if { "admin" in input.claims.roles }

blocked if { lower(input.claims.sub) == "mallory" }

blocked if { count(input.claims.roles) > 3 }
"#;

fn input(i: usize) -> Value {
    let method = if i % 3 == 0 { "GET" } else { "DELETE" };
    let sub = if i % 7 == 0 { "Mallory" } else { "u1" };
    let roles: Vec<&str> = match i % 4 {
        0 => vec![],
        1 => vec!["admin"],
        2 => vec!["viewer", "admin"],
        _ => vec!["a", "b", "c", "admin"],
    };
    json!({"request": {"method": method}, "claims": {"sub": sub, "roles": roles}})
}

#[test]
fn verdicts_follow_the_rules() {
    let prepared = policy::prepare(POLICY, "data.http.authz.allow").unwrap();
    let allowed = |v: Value| prepared.eval(&v).unwrap().allowed();

    assert!(allowed(json!({"request": {"method": "GET"}, "claims": {"sub": "u1", "roles": []}})));
    assert!(allowed(json!({"request": {"method": "POST"}, "claims": {"sub": "u1", "roles": ["admin"]}})));
    assert!(!allowed(json!({"request": {"method": "POST"}, "claims": {"sub": "MALLORY", "roles": ["admin"]}})));
    assert!(!allowed(json!({"request": {"method": "POST"}, "claims": {"sub": "u1", "roles": ["a", "b", "c", "admin"]}})));
    assert!(!allowed(json!({"request": {"method": "POST"}, "claims": {"sub": "u1", "roles": ["viewer"]}})));
    // No claims at all: every rule body is undefined, the default applies.
    assert!(!allowed(json!({"request": {"method": "POST"}, "claims": null})));
}

#[test]
fn broken_modules_fail_at_compile_time() {
    let syntax = policy::prepare("package a\nallow if {\n input.x ==\n}", "data.a.allow").unwrap_err();
    assert!(matches!(syntax, PolicyError::Compile(_)));

    let unsafe_var = policy::prepare("package a\nallow if { input.x == y }", "data.a.allow").unwrap_err();
    assert!(matches!(unsafe_var, PolicyError::Compile(_)));

    let query = policy::prepare("package a\nallow = true", "input.x").unwrap_err();
    assert!(matches!(query, PolicyError::Query { .. }));

    let missing_rule = policy::prepare("package a\nallow = true", "data.a.deny").unwrap_err();
    assert!(matches!(missing_rule, PolicyError::Query { .. }));
}

#[test]
fn iteration_and_membership_forms_are_accepted() {
    let some_in = policy::prepare(
        "package a\n\nallow if {\n    some r in input.claims.roles\n    r == \"admin\"\n}",
        "data.a.allow",
    )
    .unwrap();
    let wildcard = policy::prepare(
        "package a\n\nallow if input.claims.roles[_] == \"admin\"",
        "data.a.allow",
    )
    .unwrap();

    for prepared in [&some_in, &wildcard] {
        let admin = json!({"claims": {"roles": ["viewer", "admin"]}});
        let viewer = json!({"claims": {"roles": ["viewer"]}});
        assert!(prepared.eval(&admin).unwrap().allowed());
        assert!(!prepared.eval(&viewer).unwrap().allowed());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_tasks_see_the_sequential_verdicts() {
    let authorizer = Arc::new(InProcessAuthorizer::new(POLICY, "data.http.authz.allow").unwrap());

    let mut expected = Vec::new();
    for i in 0..200 {
        expected.push(authorizer.authorize(&input(i)).await.unwrap());
    }

    let handles: Vec<_> = (0..200)
        .map(|i| {
            let authorizer = Arc::clone(&authorizer);
            tokio::spawn(async move { authorizer.authorize(&input(i)).await.unwrap() })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.await.unwrap(), expected[i], "input {i}");
    }
}

#[test]
fn prepared_query_is_shared_across_threads() {
    let prepared = Arc::new(policy::prepare(POLICY, "data.http.authz.allow").unwrap());
    let expected: Vec<bool> = (0..64)
        .map(|i| prepared.eval(&input(i)).unwrap().allowed())
        .collect();

    std::thread::scope(|scope| {
        for t in 0..8 {
            let prepared = Arc::clone(&prepared);
            let expected = &expected;
            scope.spawn(move || {
                for i in (t..64).step_by(8) {
                    assert_eq!(prepared.eval(&input(i)).unwrap().allowed(), expected[i]);
                }
            });
        }
    });
}
