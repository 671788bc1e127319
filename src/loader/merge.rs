//! Merging of stub companions over loaded modules

use crate::collections::ModulesCollection;
use crate::models::{Kind, NodeId};

/// Merge the stub tree rooted at `stubs` into `obj`
///
/// Matching members are merged recursively, stub types winning. Members only
/// present in the stubs are moved over. An alias in `obj` shadowed by a
/// concrete stub object is replaced by it.
pub(crate) fn merge_stubs(modules: &mut ModulesCollection, obj: NodeId, stubs: NodeId) {
    let mut stack = vec![(obj, stubs)];

    while let Some((obj, stubs)) = stack.pop() {
        merge_fields(modules, obj, stubs);

        for (name, stub_member) in modules.members(stubs) {
            let Some(obj_member) = modules.member(obj, &name) else {
                modules.set_member(obj, stub_member);
                continue;
            };

            let obj_kind = modules.object(obj_member).map(|object| object.kind);
            let stub_kind = modules.object(stub_member).map(|object| object.kind);
            match (obj_kind, stub_kind) {
                (None, Some(_)) => modules.set_member(obj, stub_member),
                (Some(obj_kind), Some(stub_kind)) if obj_kind == stub_kind => {
                    stack.push((obj_member, stub_member));
                }
                (Some(obj_kind), Some(stub_kind)) => tracing::debug!(
                    "Cannot merge stubs for {}: kind {} != {}",
                    modules.path(obj_member),
                    obj_kind,
                    stub_kind
                ),
                _ => {}
            }
        }
    }
}

fn merge_fields(modules: &mut ModulesCollection, obj: NodeId, stubs: NodeId) {
    let Some(stub) = modules.object(stubs).cloned() else {
        return;
    };
    let Some(object) = modules.object_mut(obj) else {
        return;
    };

    if object.docstring.is_none() {
        object.docstring = stub.docstring;
    }
    match object.kind {
        Kind::Module => {
            if object.exports.is_none() {
                object.exports = stub.exports;
            }
        }
        Kind::Class => {
            if object.bases.is_empty() {
                object.bases = stub.bases;
            }
        }
        Kind::Function => {
            if stub.signature.is_some() {
                object.signature = stub.signature;
            }
        }
        Kind::Attribute => {
            if stub.annotation.is_some() {
                object.annotation = stub.annotation;
            }
            let stub_value = stub.value.filter(|value| value != "...");
            if object.value.is_none() {
                object.value = stub_value;
            }
        }
    }
}
