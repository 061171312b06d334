/// Sentinel naming the server's default branch.
pub const DEFAULT_BRANCH: &str = "<default>";

const MASTER_REF: &str = "refs/heads/master";

pub fn branch_or_default(branch_name: Option<&str>) -> &str {
    branch_name.unwrap_or(DEFAULT_BRANCH)
}

/// Maps an absent branch and `refs/heads/master` to [`DEFAULT_BRANCH`];
/// everything else passes through unchanged.
pub fn normalize_branch(branch_name: Option<&str>) -> &str {
    let branch = branch_or_default(branch_name);

    if branch == MASTER_REF {
        return DEFAULT_BRANCH;
    }

    branch
}
