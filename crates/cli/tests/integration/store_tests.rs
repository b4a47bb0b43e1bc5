//! Store commands against the file substrate.

use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn store_lifecycle_on_every_layout() {
  for capability in ["flat", "native-map", "scan"] {
    let env = TestEnv::with_capability(capability);

    let created = env.run_json(&["store", "create", "inventory"]);
    let id = created["id"].as_u64().unwrap();
    assert_eq!(env.run(&["store", "find", "inventory"]).trim(), id.to_string());

    env.run(&["store", "put", "inventory", "apples", "3"]);
    env.run(&["store", "put", "inventory", "pears", "5"]);
    assert_eq!(env.run(&["store", "get", "inventory", "apples"]).trim(), "3");
    assert_eq!(env.run(&["store", "size", "inventory"]).trim(), "2");
    assert_eq!(env.run(&["store", "has", "inventory", "pears"]).trim(), "true");

    let deleted = env.run_json(&["store", "del", "inventory", "pears"]);
    assert_eq!(deleted["removed"], true, "{capability}");
    assert_eq!(env.run(&["store", "has", "inventory", "pears"]).trim(), "false");

    env.run(&["store", "clear", "inventory"]);
    assert_eq!(env.run(&["store", "size", "inventory"]).trim(), "0");

    env.run(&["store", "remove", "inventory"]);
    env
      .cmd()
      .args(["store", "find", "inventory"])
      .assert()
      .failure()
      .stderr(predicate::str::contains("not found"));
  }
}

#[test]
fn create_twice_fails_unless_or_get() {
  let env = TestEnv::flat();
  let first = env.run_json(&["store", "create", "once"]);

  env.cmd().args(["store", "create", "once"]).assert().failure();
  let again = env.run_json(&["store", "create", "once", "--or-get"]);
  assert_eq!(again["id"], first["id"]);
}

#[test]
fn list_prints_every_pair() {
  let env = TestEnv::flat();
  env.run(&["store", "create", "colours"]);
  for (key, value) in [("red", "ff0000"), ("green", "00ff00"), ("blue", "0000ff")] {
    env.run(&["store", "put", "colours", key, value]);
  }

  let listed = env.run_json(&["store", "list", "colours"]);
  assert_eq!(listed["count"], 3);
  let keys: Vec<&str> = listed["items"]
    .as_array()
    .unwrap()
    .iter()
    .map(|item| item["key"].as_str().unwrap())
    .collect();
  assert_eq!(keys, ["blue", "green", "red"]);
}

#[test]
fn find_reports_metadata() {
  let env = TestEnv::flat();
  env.run(&["store", "create", "typed", "--key-type", "int64", "--value-type", "blob"]);

  let found = env.run_json(&["store", "find", "typed"]);
  assert_eq!(found["key_type"], "int64");
  assert_eq!(found["value_type"], "blob");
}

#[test]
fn metadata_field_names_work_as_keys() {
  let env = TestEnv::with_capability("native-map");
  env.run(&["store", "create", "plain"]);
  env.run(&["store", "put", "plain", "dps_name_of_this_store", "x"]);

  assert_eq!(env.run(&["store", "get", "plain", "dps_name_of_this_store"]).trim(), "x");
  assert_eq!(env.run(&["store", "size", "plain"]).trim(), "1");
  let found = env.run_json(&["store", "find", "plain"]);
  assert_eq!(found["name"], "plain");
}

#[test]
fn missing_key_fails() {
  let env = TestEnv::flat();
  env.run(&["store", "create", "sparse"]);
  env
    .cmd()
    .args(["store", "get", "sparse", "nothing"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("not found"));
}
