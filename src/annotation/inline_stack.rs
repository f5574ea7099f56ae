use crate::cfg::{Function, ScopeId, Statement};
use crate::error::{Error, Result};
use crate::format::MAX_INLINE_STACK_DEPTH;
use crate::model::SourceLocation;

/// Call-site locations enclosing a statement, innermost first
pub type InlineCallStack<'a> = Vec<&'a SourceLocation>;

/// Rebuild the inline call stack of `stmt` from its enclosing scopes.
///
/// The walk starts at the parent of the statement's own scope. Scopes
/// without a location and repeats of the previous location are skipped.
pub fn inline_stack<'a>(function: &'a Function, stmt: &Statement) -> Result<InlineCallStack<'a>> {
    let mut stack = Vec::new();
    if let Some(scope) = stmt.scope {
        let start = function.scope(scope)?.parent;
        walk_scopes(function, start, &mut stack)?;
    }
    Ok(stack)
}

/// Stack identifying the inline instantiation a statement belongs to: the
/// statement's own location followed by its enclosing call sites
pub fn callsite_stack<'a>(function: &'a Function, stmt: &'a Statement) -> Result<InlineCallStack<'a>> {
    let Some(location) = stmt.location.as_ref() else {
        return Ok(Vec::new());
    };
    let mut stack = vec![location];
    if let Some(scope) = stmt.scope {
        let start = function.scope(scope)?.parent;
        walk_scopes(function, start, &mut stack)?;
    }
    Ok(stack)
}

fn walk_scopes<'a>(
    function: &'a Function,
    start: Option<ScopeId>,
    stack: &mut InlineCallStack<'a>,
) -> Result<()> {
    let mut last: Option<&SourceLocation> = None;
    let mut current = start;
    let mut steps = 0usize;

    while let Some(id) = current {
        steps += 1;
        if steps > function.scopes.len() {
            return Err(Error::InvalidGraph(format!(
                "lexical scopes of {} form a cycle",
                function.name
            )));
        }

        let scope = function.scope(id)?;
        current = scope.parent;

        let Some(location) = scope.location.as_ref() else {
            continue;
        };
        if last == Some(location) {
            continue;
        }
        last = Some(location);

        if stack.len() == MAX_INLINE_STACK_DEPTH {
            return Err(Error::Overflow {
                depth: stack.len() + 1,
                max: MAX_INLINE_STACK_DEPTH,
            });
        }
        stack.push(location);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_skips_missing_and_repeated_locations() {
        let mut function = Function::new("main", "main");
        let outer = function.add_scope(None, None);
        let call = function.add_scope(Some(outer), Some(SourceLocation::new("main.c", 10)));
        let repeat = function.add_scope(Some(call), Some(SourceLocation::new("main.c", 10)));
        let unnamed = function.add_scope(Some(repeat), None);
        let inner = function.add_scope(Some(unnamed), Some(SourceLocation::new("util.h", 4)));
        let body = function.add_scope(Some(inner), Some(SourceLocation::new("ignored.h", 1)));

        let stmt = Statement::new(SourceLocation::new("util.h", 7), Some(body));
        let stack = inline_stack(&function, &stmt).unwrap();
        let frames: Vec<String> = stack.iter().map(|loc| loc.to_string()).collect();
        assert_eq!(frames, vec!["util.h:4", "main.c:10"]);
    }

    #[test]
    fn test_statement_without_scope_has_empty_stack() {
        let function = Function::new("main", "main");
        let stmt = Statement::new(SourceLocation::new("main.c", 3), None);
        assert!(inline_stack(&function, &stmt).unwrap().is_empty());
    }

    #[test]
    fn test_callsite_stack_starts_with_statement() {
        let mut function = Function::new("main", "main");
        let call = function.add_scope(None, Some(SourceLocation::new("main.c", 10)));
        let body = function.add_scope(Some(call), None);
        let stmt = Statement::new(SourceLocation::new("main.c", 20), Some(body));
        let stack = callsite_stack(&function, &stmt).unwrap();
        assert_eq!(stack.len(), 2);
        assert_eq!(stack[0].line, 20);
        assert_eq!(stack[1].line, 10);
    }

    #[test]
    fn test_deep_stack_overflows() {
        let mut function = Function::new("deep", "deep");
        let mut parent = None;
        for line in 0..=MAX_INLINE_STACK_DEPTH as u32 + 1 {
            parent = Some(function.add_scope(parent, Some(SourceLocation::new("deep.c", line + 1))));
        }
        let stmt = Statement::new(SourceLocation::new("deep.c", 9999), parent);
        let result = inline_stack(&function, &stmt);
        assert!(matches!(result, Err(Error::Overflow { max: MAX_INLINE_STACK_DEPTH, .. })));
    }

    #[test]
    fn test_stack_at_depth_limit() {
        let mut function = Function::new("deep", "deep");
        let mut parent = None;
        for line in 0..MAX_INLINE_STACK_DEPTH as u32 {
            parent = Some(function.add_scope(parent, Some(SourceLocation::new("deep.c", line + 1))));
        }
        let body = function.add_scope(parent, None);
        let stmt = Statement::new(SourceLocation::new("deep.c", 9999), Some(body));
        let stack = inline_stack(&function, &stmt).unwrap();
        assert_eq!(stack.len(), MAX_INLINE_STACK_DEPTH);
        assert_eq!(stack[0].line, MAX_INLINE_STACK_DEPTH as u32);
    }

    #[test]
    fn test_scope_cycle_is_rejected() {
        let mut function = Function::new("loop", "loop");
        let a = function.add_scope(None, Some(SourceLocation::new("a.c", 1)));
        let b = function.add_scope(Some(a), Some(SourceLocation::new("a.c", 2)));
        function.scopes[a].parent = Some(b);
        let c = function.add_scope(Some(b), None);
        let stmt = Statement::new(SourceLocation::new("a.c", 3), Some(c));
        assert!(matches!(inline_stack(&function, &stmt), Err(Error::InvalidGraph(_))));
    }
}
