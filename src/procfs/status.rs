/// Returns the innermost namespace pid from the content of `/proc/<pid>/status`.
///
/// The `NSpid:` line lists the process id in every PID namespace the process is a member
/// of, from the outermost (host) to the innermost; the last field is the id the process
/// sees for itself. Returns `None` if the line is missing (kernels before 4.1) or empty.
///
/// This assumes the exporter runs in the initial PID namespace, or at least in an
/// ancestor of every container's namespace, so the list is never truncated on the left.
pub(super) fn find_ns_pid(status: &str) -> Option<&str> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("NSpid:"))
        .and_then(|ids| ids.split_whitespace().next_back())
}
