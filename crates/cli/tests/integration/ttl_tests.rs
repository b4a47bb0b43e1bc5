use super::common::TestEnv;

#[test]
fn ttl_entries_persist_between_invocations() {
  let env = TestEnv::flat();
  env.run(&["ttl", "put", "session", "abc123"]);
  assert_eq!(env.run(&["ttl", "get", "session"]).trim(), "abc123");
  assert_eq!(env.run(&["ttl", "has", "session"]).trim(), "true");

  let deleted = env.run_json(&["ttl", "del", "session"]);
  assert_eq!(deleted["removed"], true);
  assert_eq!(env.run(&["ttl", "has", "session"]).trim(), "false");
  env.cmd().args(["ttl", "get", "session"]).assert().failure();
}

#[test]
fn ttl_entries_expire() {
  let env = TestEnv::flat();
  env.run(&["ttl", "put", "brief", "soon-gone", "--ttl", "1"]);
  std::thread::sleep(std::time::Duration::from_millis(2100));
  assert_eq!(env.run(&["ttl", "has", "brief"]).trim(), "false");
}
