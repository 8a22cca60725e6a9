//! The six end-to-end scenarios from the design notes, run against every
//! engine whose capability set supports the operations each one exercises
//! (Nop only supports the smoke scenario — it has no commit at all).

use palimpsest::{Backend, Value};

fn scenario_smoke(backend: Backend) {
    let (head, _) = backend.branch(&[]).unwrap();
    let v = head.new_node().unwrap();
    v.set("f", 5i64.into()).unwrap();
    assert_eq!(v.get("f").unwrap(), Value::Int(5));
}

#[test]
fn scenario_1_smoke_nop() {
    scenario_smoke(Backend::nop());
}

#[test]
fn scenario_1_smoke_copy() {
    scenario_smoke(Backend::copy());
}

#[test]
fn scenario_1_smoke_bsearch_partial() {
    scenario_smoke(Backend::bsearch_partial());
}

#[test]
fn scenario_1_smoke_split_partial() {
    scenario_smoke(Backend::split_partial());
}

#[test]
fn scenario_1_smoke_bsearch_linearized_full() {
    scenario_smoke(Backend::bsearch_linearized_full());
}

#[test]
fn scenario_1_smoke_bst_linearized_full() {
    scenario_smoke(Backend::bst_linearized_full());
}

#[test]
fn scenario_1_smoke_split_linearized_full() {
    scenario_smoke(Backend::split_linearized_full());
}

fn scenario_commit_isolation(backend: Backend) {
    let (head, _) = backend.branch(&[]).unwrap();
    let v = head.new_node().unwrap();
    v.set("f", 5i64.into()).unwrap();

    let (_c, mut committed) = backend.commit(&[v.clone()]).unwrap();
    let vc = committed.remove(0);

    v.set("f", 8i64.into()).unwrap();

    assert_eq!(vc.get("f").unwrap(), Value::Int(5));
    assert_eq!(v.get("f").unwrap(), Value::Int(8));
}

#[test]
fn scenario_2_commit_isolation_copy() {
    scenario_commit_isolation(Backend::copy());
}

#[test]
fn scenario_2_commit_isolation_bsearch_partial() {
    scenario_commit_isolation(Backend::bsearch_partial());
}

#[test]
fn scenario_2_commit_isolation_split_partial() {
    scenario_commit_isolation(Backend::split_partial());
}

#[test]
fn scenario_2_commit_isolation_bsearch_linearized_full() {
    scenario_commit_isolation(Backend::bsearch_linearized_full());
}

#[test]
fn scenario_2_commit_isolation_bst_linearized_full() {
    scenario_commit_isolation(Backend::bst_linearized_full());
}

#[test]
fn scenario_2_commit_isolation_split_linearized_full() {
    scenario_commit_isolation(Backend::split_linearized_full());
}

fn scenario_cycle_commit(backend: Backend) {
    let (head, _) = backend.branch(&[]).unwrap();
    let v1 = head.new_node().unwrap();
    let v2 = head.new_node().unwrap();
    v1.set("p", Value::Vnode(v2.clone())).unwrap();
    v2.set("p", Value::Vnode(v1.clone())).unwrap();

    let (_c, mut committed) = backend.commit(&[v1.clone(), v2.clone()]).unwrap();
    let cv2 = committed.pop().unwrap();
    let cv1 = committed.pop().unwrap();

    assert_eq!(cv1.get("p").unwrap(), Value::Vnode(cv2.clone()));
    assert_eq!(cv2.get("p").unwrap(), Value::Vnode(cv1.clone()));
}

#[test]
fn scenario_3_cycle_commit_copy() {
    scenario_cycle_commit(Backend::copy());
}

#[test]
fn scenario_3_cycle_commit_bsearch_partial() {
    scenario_cycle_commit(Backend::bsearch_partial());
}

#[test]
fn scenario_3_cycle_commit_split_partial() {
    scenario_cycle_commit(Backend::split_partial());
}

#[test]
fn scenario_3_cycle_commit_bsearch_linearized_full() {
    scenario_cycle_commit(Backend::bsearch_linearized_full());
}

#[test]
fn scenario_3_cycle_commit_bst_linearized_full() {
    scenario_cycle_commit(Backend::bst_linearized_full());
}

#[test]
fn scenario_3_cycle_commit_split_linearized_full() {
    scenario_cycle_commit(Backend::split_linearized_full());
}

const MANY_COMMITS: i64 = 200;

fn scenario_many_commits(backend: Backend) {
    let (head, _) = backend.branch(&[]).unwrap();
    let v = head.new_node().unwrap();

    let mut commits = Vec::with_capacity(MANY_COMMITS as usize);
    for i in 0..MANY_COMMITS {
        v.set("val", i.into()).unwrap();
        let (_c, mut rebound) = backend.commit(&[v.clone()]).unwrap();
        commits.push(rebound.remove(0));
    }

    for (i, c) in commits.iter().enumerate() {
        assert_eq!(c.get("val").unwrap(), Value::Int(i as i64));
    }
}

#[test]
fn scenario_4_many_commits_copy() {
    scenario_many_commits(Backend::copy());
}

#[test]
fn scenario_4_many_commits_bsearch_partial() {
    scenario_many_commits(Backend::bsearch_partial());
}

#[test]
fn scenario_4_many_commits_split_partial() {
    scenario_many_commits(Backend::split_partial());
}

#[test]
fn scenario_4_many_commits_bsearch_linearized_full() {
    scenario_many_commits(Backend::bsearch_linearized_full());
}

#[test]
fn scenario_4_many_commits_bst_linearized_full() {
    scenario_many_commits(Backend::bst_linearized_full());
}

#[test]
fn scenario_4_many_commits_split_linearized_full() {
    scenario_many_commits(Backend::split_linearized_full());
}

fn scenario_branch_divergence(backend: Backend) {
    let (head, _) = backend.branch(&[]).unwrap();
    let v = head.new_node().unwrap();
    v.set("f", 5i64.into()).unwrap();

    let (_c, mut committed) = backend.commit(&[v.clone()]).unwrap();
    let vc = committed.remove(0);
    v.set("f", 8i64.into()).unwrap();

    let (_h2, mut branched) = backend.branch(&[vc.clone()]).unwrap();
    let vc2 = branched.remove(0);
    vc2.set("f", 9i64.into()).unwrap();

    assert_eq!(v.get("f").unwrap(), Value::Int(8));
    assert_eq!(vc.get("f").unwrap(), Value::Int(5));
    assert_eq!(vc2.get("f").unwrap(), Value::Int(9));
}

#[test]
fn scenario_5_branch_divergence_copy() {
    scenario_branch_divergence(Backend::copy());
}

#[test]
fn scenario_5_branch_divergence_bsearch_linearized_full() {
    scenario_branch_divergence(Backend::bsearch_linearized_full());
}

#[test]
fn scenario_5_branch_divergence_bst_linearized_full() {
    scenario_branch_divergence(Backend::bst_linearized_full());
}

#[test]
fn scenario_5_branch_divergence_split_linearized_full() {
    scenario_branch_divergence(Backend::split_linearized_full());
}

const CHAIN_STEPS: i64 = 40;

/// Four vnodes, fully cross-linked, mutated and committed step by step;
/// every commit's quadruple must report its own step's scalar values and
/// resolve its cross-links back to itself.
fn scenario_chain_split(backend: Backend) {
    let (head, _) = backend.branch(&[]).unwrap();
    let a = head.new_node().unwrap();
    let b = head.new_node().unwrap();
    let c = head.new_node().unwrap();
    let d = head.new_node().unwrap();

    a.set("next", Value::Vnode(b.clone())).unwrap();
    b.set("next", Value::Vnode(c.clone())).unwrap();
    c.set("next", Value::Vnode(d.clone())).unwrap();
    d.set("next", Value::Vnode(a.clone())).unwrap();

    let mut commits = Vec::with_capacity(CHAIN_STEPS as usize);
    for i in 0..CHAIN_STEPS {
        a.set("val", i.into()).unwrap();
        b.set("val", i.into()).unwrap();
        c.set("val", i.into()).unwrap();
        d.set("val", i.into()).unwrap();

        let (_commit, mut rebound) = backend
            .commit(&[a.clone(), b.clone(), c.clone(), d.clone()])
            .unwrap();
        let cd = rebound.remove(3);
        let cc = rebound.remove(2);
        let cb = rebound.remove(1);
        let ca = rebound.remove(0);
        commits.push((ca, cb, cc, cd));
    }

    for (i, (ca, cb, cc, cd)) in commits.iter().enumerate() {
        let i = i as i64;
        assert_eq!(ca.get("val").unwrap(), Value::Int(i));
        assert_eq!(cb.get("val").unwrap(), Value::Int(i));
        assert_eq!(cc.get("val").unwrap(), Value::Int(i));
        assert_eq!(cd.get("val").unwrap(), Value::Int(i));

        assert_eq!(ca.get("next").unwrap(), Value::Vnode(cb.clone()));
        assert_eq!(cb.get("next").unwrap(), Value::Vnode(cc.clone()));
        assert_eq!(cc.get("next").unwrap(), Value::Vnode(cd.clone()));
        assert_eq!(cd.get("next").unwrap(), Value::Vnode(ca.clone()));
    }
}

#[test]
fn scenario_6_chain_split_split_partial() {
    scenario_chain_split(Backend::split_partial());
}

#[test]
fn scenario_6_chain_split_split_linearized_full() {
    scenario_chain_split(Backend::split_linearized_full());
}

#[test]
fn scenario_6_chain_split_copy() {
    scenario_chain_split(Backend::copy());
}
