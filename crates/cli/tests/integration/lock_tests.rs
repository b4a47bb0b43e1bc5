//! Lock commands. Each invocation is its own process, so a lock taken by
//! one command is held against the next.

use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn acquire_release_cycle() {
  let env = TestEnv::flat();
  let created = env.run_json(&["lock", "create", "deploy"]);
  assert_eq!(env.run(&["lock", "pid", "deploy"]).trim(), "0");

  let acquired = env.run_json(&["lock", "acquire", "deploy", "--lease", "30"]);
  assert_eq!(acquired["id"], created["id"]);
  let holder = acquired["pid"].as_u64().unwrap();
  assert_ne!(holder, 0);
  assert_eq!(env.run(&["lock", "pid", "deploy"]).trim(), holder.to_string());

  env
    .cmd()
    .args(["lock", "acquire", "deploy", "--wait", "0"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("deploy").or(predicate::str::contains("lock")));

  env.run(&["lock", "release", "deploy"]);
  env.run(&["lock", "acquire", "deploy", "--wait", "1"]);
}

#[test]
fn remove_deletes_the_lock() {
  let env = TestEnv::with_capability("scan");
  env.run(&["lock", "create", "temporary"]);
  env.run(&["lock", "remove", "temporary"]);

  env
    .cmd()
    .args(["lock", "pid", "temporary"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("not found"));
}

#[test]
fn release_of_unknown_lock_fails() {
  let env = TestEnv::flat();
  env
    .cmd()
    .args(["lock", "release", "ghost"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("not found"));
}
