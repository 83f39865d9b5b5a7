use std::collections::{HashMap, HashSet};

use ledger_tenancy::document::LedgerDocument;
use ledger_tenancy::id::UuidV7Ids;
use ledger_tenancy::migrate::migrate_document;
use proptest::prelude::*;
use serde_json::{json, Value};

#[derive(Debug, Clone)]
struct Ledger {
    users: usize,
    /// Number of template items under each template category.
    items_per_category: Vec<usize>,
    /// (owner index or none, category index) per transaction.
    transactions: Vec<(Option<usize>, usize)>,
    budgets: Vec<usize>,
}

fn ledger_strategy() -> impl Strategy<Value = Ledger> {
    (1usize..5, prop::collection::vec(0usize..4, 1..5)).prop_flat_map(|(users, items)| {
        let categories = items.len();
        (
            Just(users),
            Just(items),
            prop::collection::vec(
                (prop::option::of(0..users), 0..categories),
                0..12,
            ),
            prop::collection::vec(0..categories, 0..6),
        )
            .prop_map(|(users, items_per_category, transactions, budgets)| Ledger {
                users,
                items_per_category,
                transactions,
                budgets,
            })
    })
}

fn to_document(ledger: &Ledger) -> Value {
    let users: Vec<Value> = (0..ledger.users)
        .map(|u| json!({"id": format!("u{u}"), "email": format!("user{u}@example.com")}))
        .collect();
    let mut categories = Vec::new();
    let mut items = Vec::new();
    for (c, count) in ledger.items_per_category.iter().enumerate() {
        categories.push(json!({"id": c, "name": format!("Category {c}")}));
        for i in 0..*count {
            items.push(json!({
                "id": format!("i{c}-{i}"),
                "name": format!("Item {i}"),
                "categoryId": c
            }));
        }
    }
    let transactions: Vec<Value> = ledger
        .transactions
        .iter()
        .enumerate()
        .map(|(n, (owner, c))| match owner {
            Some(u) => json!({"id": n, "userId": format!("u{u}"), "category_id": c}),
            None => json!({"id": n, "category_id": c}),
        })
        .collect();
    let budgets: Vec<Value> = ledger
        .budgets
        .iter()
        .enumerate()
        .map(|(n, c)| json!({"id": n, "category_id": c}))
        .collect();
    json!({
        "users": users,
        "categories": categories,
        "items": items,
        "transactions": transactions,
        "budgets": budgets,
        "goals": [{"id": "g1", "target": 100}]
    })
}

proptest! {
    #[test]
    fn migration_preserves_tenant_invariants(ledger in ledger_strategy()) {
        let input = to_document(&ledger);
        let document = LedgerDocument::from_value(input.clone()).unwrap();
        let out = migrate_document(&document, &mut UuidV7Ids).unwrap();
        let doc = out.document.as_map();

        let categories = doc["categories"].as_array().unwrap();
        let items = doc["items"].as_array().unwrap();

        // Clone ids never repeat, within or across users.
        let mut owner_of: HashMap<String, String> = HashMap::new();
        for entity in categories.iter().chain(items.iter()) {
            let id = entity["id"].as_str().unwrap().to_string();
            let owner = entity["email"].as_str().unwrap().to_string();
            prop_assert!(owner_of.insert(id, owner).is_none());
        }

        // Every user gets the whole hierarchy.
        for u in 0..ledger.users {
            let email = format!("user{u}@example.com");
            for (c, count) in ledger.items_per_category.iter().enumerate() {
                let name = format!("Category {c}");
                let clone = categories
                    .iter()
                    .find(|cat| cat["email"] == email.as_str() && cat["name"] == name.as_str())
                    .unwrap();
                let children = items
                    .iter()
                    .filter(|item| item["categoryId"] == clone["id"])
                    .count();
                prop_assert_eq!(children, *count);
            }
        }

        // Each transaction points at its owner's category.
        let emails: HashMap<String, String> = (0..ledger.users)
            .map(|u| (format!("u{u}"), format!("user{u}@example.com")))
            .collect();
        for txn in doc["transactions"].as_array().unwrap() {
            let owner = &emails[txn["userId"].as_str().unwrap()];
            prop_assert_eq!(txn["email"].as_str().unwrap(), owner.as_str());
            let category = txn["category_id"].as_str().unwrap();
            prop_assert_eq!(&owner_of[category], owner);
        }

        for budget in doc["budgets"].as_array().unwrap() {
            prop_assert_eq!(&budget["email"], &json!("user0@example.com"));
        }

        prop_assert_eq!(&doc["users"], &input["users"]);
        prop_assert_eq!(&doc["goals"], &input["goals"]);
        prop_assert!(!out.summary.has_warnings());

        let ids: HashSet<&str> = owner_of.keys().map(String::as_str).collect();
        prop_assert_eq!(ids.len(), categories.len() + items.len());
    }

    #[test]
    fn migrating_twice_is_a_fixed_point(ledger in ledger_strategy()) {
        let document = LedgerDocument::from_value(to_document(&ledger)).unwrap();
        let once = migrate_document(&document, &mut UuidV7Ids).unwrap();
        let twice = migrate_document(&once.document, &mut UuidV7Ids).unwrap();
        prop_assert_eq!(twice.summary.clone.categories_cloned, 0);
        prop_assert_eq!(twice.summary.clone.items_cloned, 0);
        prop_assert_eq!(twice.document, once.document);
    }
}
