//! GraphQL documents for every operation the crate issues.

/// A named GraphQL document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operation {
    /// Operation name; matches the name declared in `document`.
    pub name: &'static str,
    /// GraphQL document text.
    pub document: &'static str,
}

pub const GPU_TYPES: Operation = Operation {
    name: "GpuTypes",
    document: r"
query GpuTypes {
    gpuTypes {
        id
        displayName
        memoryInGb
        securePrice
        communityPrice
        secureSpotPrice
        communitySpotPrice
    }
}",
};

pub const POD_TEMPLATES: Operation = Operation {
    name: "PodTemplates",
    document: r"
query PodTemplates {
    myself {
        podTemplates {
            id
            name
            imageName
            isPublic
        }
    }
}",
};

pub const PODS: Operation = Operation {
    name: "Pods",
    document: r"
query Pods {
    myself {
        pods {
            id
            name
            desiredStatus
            runtime {
                uptimeInSeconds
                ports {
                    ip
                    isIpPublic
                    privatePort
                    publicPort
                    type
                }
                gpus {
                    id
                    gpuUtilPercent
                    memoryUtilPercent
                }
                container {
                    cpuPercent
                    memoryPercent
                }
            }
        }
    }
}",
};

pub const POD: Operation = Operation {
    name: "Pod",
    document: r"
query Pod($input: PodFilter!) {
    pod(input: $input) {
        id
        name
        desiredStatus
        runtime {
            uptimeInSeconds
            ports {
                ip
                isIpPublic
                privatePort
                publicPort
                type
            }
            gpus {
                id
                gpuUtilPercent
                memoryUtilPercent
            }
            container {
                cpuPercent
                memoryPercent
            }
        }
    }
}",
};

pub const DEPLOY_ON_DEMAND: Operation = Operation {
    name: "DeployOnDemand",
    document: r"
mutation DeployOnDemand($input: PodFindAndDeployOnDemandInput!) {
    podFindAndDeployOnDemand(input: $input) {
        id
        imageName
        env
        machineId
        machine {
            podHostId
        }
    }
}",
};

pub const RENT_INTERRUPTABLE: Operation = Operation {
    name: "RentInterruptable",
    document: r"
mutation RentInterruptable($input: PodRentInterruptableInput!) {
    podRentInterruptable(input: $input) {
        id
        imageName
        env
        machineId
        machine {
            podHostId
        }
    }
}",
};

pub const STOP_POD: Operation = Operation {
    name: "StopPod",
    document: r"
mutation StopPod($input: PodStopInput!) {
    podStop(input: $input) {
        id
        desiredStatus
    }
}",
};

pub const TERMINATE_POD: Operation = Operation {
    name: "TerminatePod",
    document: r"
mutation TerminatePod($input: PodTerminateInput!) {
    podTerminate(input: $input)
}",
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_names_match_documents() {
        for op in [
            GPU_TYPES,
            POD_TEMPLATES,
            PODS,
            POD,
            DEPLOY_ON_DEMAND,
            RENT_INTERRUPTABLE,
            STOP_POD,
            TERMINATE_POD,
        ] {
            let declared = op
                .document
                .split_whitespace()
                .nth(1)
                .map(|s| s.split('(').next().unwrap_or(s));
            assert_eq!(declared, Some(op.name), "document for {}", op.name);
        }
    }
}
