use runtime_gateway::session_vars::SessionVariables;
use std::collections::HashMap;

#[tokio::test]
async fn snapshot_reflects_the_seeded_initial_values() {
    let vars = SessionVariables::new(HashMap::from([("name".to_string(), "Aria".to_string())]));
    let snapshot = vars.snapshot().await;
    assert_eq!(snapshot.get("name"), Some(&"Aria".to_string()));
}

#[tokio::test]
async fn set_many_overwrites_existing_keys_and_adds_new_ones() {
    let vars = SessionVariables::new(HashMap::from([("name".to_string(), "Aria".to_string())]));
    vars.set_many(HashMap::from([
        ("name".to_string(), "Nova".to_string()),
        ("tier".to_string(), "gold".to_string()),
    ]))
    .await;
    let snapshot = vars.snapshot().await;
    assert_eq!(snapshot.get("name"), Some(&"Nova".to_string()));
    assert_eq!(snapshot.get("tier"), Some(&"gold".to_string()));
}

#[tokio::test]
async fn concurrent_writers_do_not_lose_updates() {
    let vars = std::sync::Arc::new(SessionVariables::new(HashMap::new()));
    let mut handles = Vec::new();
    for i in 0..20 {
        let vars = vars.clone();
        handles.push(tokio::spawn(async move {
            vars.set_many(HashMap::from([(format!("k{i}"), format!("v{i}"))]))
                .await;
        }));
    }
    for h in handles {
        h.await.unwrap();
    }
    let snapshot = vars.snapshot().await;
    assert_eq!(snapshot.len(), 20);
    assert_eq!(snapshot.get("k7"), Some(&"v7".to_string()));
}
